//! Relay wire format — the NIP-01 subset coordscout speaks.
//!
//! Every frame is a JSON array whose first element is a label:
//!
//!   client → relay:  ["REQ", sub_id, filter]   ["CLOSE", sub_id]
//!   relay → client:  ["EVENT", sub_id, event]  ["EOSE", sub_id]
//!                    ["NOTICE", msg]           ["CLOSED", sub_id, msg]
//!                    ["OK", event_id, bool, msg]
//!
//! Filter tag values are matched case-sensitively by relays. Anything
//! looser has to be enforced client-side (see `filter.rs`).

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{json, Map, Value};
use url::Url;

use crate::event::DiscoveryEvent;

// ── Relay URL ─────────────────────────────────────────────────────────────────

/// An absolute `ws://` or `wss://` relay address.
///
/// The address is kept as written (minus surrounding whitespace) so that
/// it displays and compares the way the user entered it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelayUrl(String);

impl RelayUrl {
    pub fn parse(raw: &str) -> Result<Self, WireError> {
        let trimmed = raw.trim();
        let invalid = || WireError::InvalidRelayUrl(raw.to_string());

        let url = Url::parse(trimmed).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(invalid());
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid());
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RelayUrl {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ── Filter ────────────────────────────────────────────────────────────────────

/// Subscription filter as sent inside a REQ frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireFilter {
    pub kinds: Vec<u32>,
    /// Single-letter-or-word tag name (without `#`) → accepted values.
    pub tags: BTreeMap<String, Vec<String>>,
    pub since: Option<u64>,
    pub limit: Option<u32>,
}

impl WireFilter {
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        if !self.kinds.is_empty() {
            obj.insert("kinds".into(), json!(self.kinds));
        }
        for (tag, values) in &self.tags {
            obj.insert(format!("#{tag}"), json!(values));
        }
        if let Some(since) = self.since {
            obj.insert("since".into(), json!(since));
        }
        if let Some(limit) = self.limit {
            obj.insert("limit".into(), json!(limit));
        }
        Value::Object(obj)
    }
}

// ── Client → relay ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Req {
        subscription_id: String,
        filters: Vec<WireFilter>,
    },
    Close {
        subscription_id: String,
    },
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        match self {
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                let mut frame = vec![json!("REQ"), json!(subscription_id)];
                frame.extend(filters.iter().map(WireFilter::to_value));
                Value::Array(frame).to_string()
            }
            ClientMessage::Close { subscription_id } => {
                json!(["CLOSE", subscription_id]).to_string()
            }
        }
    }

    pub fn subscription_id(&self) -> &str {
        match self {
            ClientMessage::Req {
                subscription_id, ..
            }
            | ClientMessage::Close { subscription_id } => subscription_id,
        }
    }
}

// ── Relay → client ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Event {
        subscription_id: String,
        event: DiscoveryEvent,
    },
    EndOfStoredEvents {
        subscription_id: String,
    },
    Notice {
        message: String,
    },
    Closed {
        subscription_id: String,
        message: String,
    },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
}

impl RelayMessage {
    /// Parse a text frame received from a relay.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| WireError::Malformed(e.to_string()))?;
        let frame = value.as_array().ok_or(WireError::NotAnArray)?;
        let label = frame
            .first()
            .and_then(Value::as_str)
            .ok_or(WireError::NotAnArray)?;

        let str_at = |i: usize| -> Result<String, WireError> {
            frame
                .get(i)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| WireError::MissingField(label.to_string(), i))
        };

        match label {
            "EVENT" => {
                let subscription_id = str_at(1)?;
                let raw = frame
                    .get(2)
                    .cloned()
                    .ok_or_else(|| WireError::MissingField(label.to_string(), 2))?;
                let event = serde_json::from_value(raw)
                    .map_err(|e| WireError::InvalidEvent(e.to_string()))?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    event,
                })
            }
            "EOSE" => Ok(RelayMessage::EndOfStoredEvents {
                subscription_id: str_at(1)?,
            }),
            "NOTICE" => Ok(RelayMessage::Notice {
                message: str_at(1)?,
            }),
            "CLOSED" => Ok(RelayMessage::Closed {
                subscription_id: str_at(1)?,
                message: str_at(2).unwrap_or_default(),
            }),
            "OK" => Ok(RelayMessage::Ok {
                event_id: str_at(1)?,
                accepted: frame.get(2).and_then(Value::as_bool).unwrap_or(false),
                message: str_at(3).unwrap_or_default(),
            }),
            other => Err(WireError::UnknownLabel(other.to_string())),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting relay frames or addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("frame is not a labelled JSON array")]
    NotAnArray,

    #[error("{0} frame is missing element {1}")]
    MissingField(String, usize),

    #[error("invalid event payload: {0}")]
    InvalidEvent(String),

    #[error("unknown frame label: {0}")]
    UnknownLabel(String),

    #[error("event failed id/signature verification: {0}")]
    Unverified(String),

    #[error("not a ws:// or wss:// relay url: {0}")]
    InvalidRelayUrl(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
