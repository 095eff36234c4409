//! scout-relay — websocket connections to event relays.
//!
//! A `RelayPool` owns one task per relay. Inbound frames from every relay are
//! fanned into a single broadcast stream; a `Subscription` reads that stream
//! and yields the events that pass its `DiscoveryFilter`.

pub mod connection;
pub mod pool;
pub mod subscription;

pub use connection::ConnectionState;
pub use pool::{ConnectionError, RelayPool};
pub use subscription::{subscribe, Subscription};
