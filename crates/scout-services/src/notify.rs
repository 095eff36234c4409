//! Change notifications for a presentation shell.
//!
//! Events are fire-and-forget: with no subscriber, or a lagging one, they are
//! dropped and nothing in the pipeline waits on them.

use scout_core::RelayUrl;
use scout_relay::ConnectionState;
use tokio::sync::broadcast;

use crate::session::SessionState;

const CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// The visible candidate set gained or replaced an entry.
    CandidatesChanged,
    BusyChanged { busy: bool },
    RelayStateChanged {
        endpoint: RelayUrl,
        state: ConnectionState,
    },
    SessionStateChanged { state: SessionState },
    ExpandedCoordinatorChanged,
    /// Wallet detection finished (successfully or not).
    ConfigChanged,
}

#[derive(Clone)]
pub struct StateNotifier {
    tx: broadcast::Sender<StateEvent>,
}

impl Default for StateNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StateNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.tx.subscribe()
    }

    pub fn notify(&self, event: StateEvent) {
        tracing::trace!(event = ?event, "state event");
        let _ = self.tx.send(event);
    }
}
