//! Client-side discovery predicate.
//!
//! Relays match tag values case-sensitively, so the REQ filter only narrows
//! what a relay sends. Every delivered event is re-checked here with the
//! case-insensitive rules before it may reach the candidate registry.

use std::collections::BTreeMap;

use crate::event::{DiscoveryEvent, NETWORK_TAG, TYPE_TAG};
use crate::wire::WireFilter;

/// Kind used by coordinators to announce themselves.
pub const COORDINATOR_KIND: u32 = 15750;

/// Required value of the `type` tag.
pub const COORDINATOR_TYPE: &str = "wabisabi";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFilter {
    pub kind: u32,
    pub type_value: String,
    /// Accepted `network` tag values, already lowercased.
    networks: Vec<String>,
}

impl DiscoveryFilter {
    /// Build a filter for a wallet network name such as `"main"` or `"TestNet"`.
    ///
    /// Accepts the bare lowercased name and the same name suffixed with `net`.
    pub fn new(kind: u32, type_value: impl Into<String>, network: &str) -> Self {
        let bare = network.trim().to_lowercase();
        let suffixed = format!("{bare}net");
        Self {
            kind,
            type_value: type_value.into(),
            networks: vec![bare, suffixed],
        }
    }

    /// Filter with the standard coordinator kind and type tag.
    pub fn coordinators(network: &str) -> Self {
        Self::new(COORDINATOR_KIND, COORDINATOR_TYPE, network)
    }

    pub fn networks(&self) -> &[String] {
        &self.networks
    }

    /// Does this event pass the kind, `type` and `network` checks?
    pub fn matches(&self, event: &DiscoveryEvent) -> bool {
        if event.kind != self.kind {
            return false;
        }
        if !event.has_tag_value_ci(TYPE_TAG, std::slice::from_ref(&self.type_value)) {
            return false;
        }
        event.has_tag_value_ci(NETWORK_TAG, &self.networks)
    }

    /// The REQ filter sent to relays.
    pub fn to_wire(&self) -> WireFilter {
        let mut tags = BTreeMap::new();
        tags.insert(TYPE_TAG.to_string(), vec![self.type_value.clone()]);
        tags.insert(NETWORK_TAG.to_string(), self.networks.clone());
        WireFilter {
            kinds: vec![self.kind],
            tags,
            ..Default::default()
        }
    }
}
