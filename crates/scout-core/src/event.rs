//! Discovery events as delivered by relays.
//!
//! A coordinator announces itself by publishing a signed event of a known
//! kind, carrying `type`, `network` and `endpoint` tags. The event is kept
//! verbatim; nothing downstream mutates it.

use nostr::JsonUtil;
use serde::{Deserialize, Serialize};

use crate::wire::WireError;

/// Tag identifier for the announcement type (`"wabisabi"`).
pub const TYPE_TAG: &str = "type";

/// Tag identifier for the network the coordinator serves.
pub const NETWORK_TAG: &str = "network";

/// Tag identifier for the coordinator's HTTP endpoint.
pub const ENDPOINT_TAG: &str = "endpoint";

/// A signed event received from a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    /// Hex event id.
    pub id: String,

    /// Publisher identity, hex x-only public key.
    pub pubkey: String,

    /// Creation time, unix seconds. Recency is decided on this field alone.
    pub created_at: u64,

    pub kind: u32,

    /// Each tag is `[identifier, value, ...]`.
    #[serde(default)]
    pub tags: Vec<Vec<String>>,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub sig: String,
}

impl DiscoveryEvent {
    /// All values tagged with `name`, in tag order.
    ///
    /// Tags without a value element are skipped.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().map(String::as_str) == Some(name))
            .filter_map(|tag| tag.get(1).map(String::as_str))
    }

    /// First value tagged with `name`.
    pub fn first_tag<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.tag_values(name).next()
    }

    /// True if any `name` tag value equals one of `options`, ignoring ASCII case.
    pub fn has_tag_value_ci(&self, name: &str, options: &[String]) -> bool {
        self.tag_values(name)
            .any(|v| options.iter().any(|o| o.eq_ignore_ascii_case(v)))
    }

    /// The advertised coordinator endpoint, if any.
    pub fn endpoint(&self) -> Option<&str> {
        self.first_tag(ENDPOINT_TAG)
    }

    /// Short form of the publisher key for display and logs.
    pub fn short_pubkey(&self) -> &str {
        self.pubkey.get(..16).unwrap_or(&self.pubkey)
    }

    /// Check that `id` is the hash of the event body and `sig` is a valid
    /// schnorr signature over it by `pubkey`.
    pub fn verify(&self) -> Result<(), WireError> {
        let json =
            serde_json::to_string(self).map_err(|e| WireError::InvalidEvent(e.to_string()))?;
        let event =
            nostr::Event::from_json(json).map_err(|e| WireError::Unverified(e.to_string()))?;
        event
            .verify()
            .map_err(|e| WireError::Unverified(e.to_string()))
    }
}
