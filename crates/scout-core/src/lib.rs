//! scout-core — shared types, relay wire format, and configuration.
//! All other coordscout crates depend on this one.

pub mod config;
pub mod event;
pub mod filter;
pub mod round;
pub mod wire;

pub use config::{ConfigError, Detection, ScoutConfig, WalletConfig};
pub use event::DiscoveryEvent;
pub use filter::DiscoveryFilter;
pub use round::{RoundParameters, StatusRequest, StatusResponse};
pub use wire::{ClientMessage, RelayMessage, RelayUrl, WireError, WireFilter};
