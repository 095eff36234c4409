//! Discovery session — one relay pool, one subscription, one candidate set.
//!
//! Lifecycle (driven by `ScoutContext`):
//!
//!   Idle ──start──► Starting ──connected──► Active ──stop──► Stopping ──► Idle
//!                       ▲                      │
//!                       └─────── restart ──────┘
//!
//! A session is never reused. Restarting cancels the old one and builds a
//! fresh session with its own token, pool and registry, so a background task
//! that outlives its session can only ever touch state nobody reads anymore.

use std::fmt;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use scout_core::{ConfigError, DiscoveryFilter, RelayUrl};
use scout_relay::{subscribe, ConnectionError, RelayPool, Subscription};

use crate::notify::{StateEvent, StateNotifier};
use crate::registry::CandidateRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Result of a start request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Subscribed; `relays` connections were open when the session went live.
    Active { relays: usize },
    /// No wallet network known yet; nothing was started.
    NoNetwork,
    /// Another start or a stop won the race while this one was connecting.
    Superseded,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("no usable relay configured")]
    NoRelays,

    #[error("none of the {rejected} relay urls given is a valid ws:// or wss:// address")]
    InvalidRelays { rejected: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub struct DiscoverySession {
    network: String,
    relays: Vec<RelayUrl>,
    pool: RelayPool,
    registry: CandidateRegistry,
    token: CancellationToken,
}

impl DiscoverySession {
    pub fn new(
        network: impl Into<String>,
        relays: Vec<RelayUrl>,
        reconnect_delay: Duration,
        notifier: StateNotifier,
    ) -> Self {
        Self {
            network: network.into(),
            relays,
            pool: RelayPool::new(reconnect_delay),
            registry: CandidateRegistry::with_notifier(notifier),
            token: CancellationToken::new(),
        }
    }

    /// Open the relay connections, waiting at most `timeout` for all of them.
    ///
    /// Relay state changes are forwarded to `notifier` for as long as the
    /// session lives.
    pub async fn connect(
        &self,
        timeout: Duration,
        notifier: &StateNotifier,
    ) -> Result<usize, ConnectionError> {
        tokio::spawn(forward_relay_states(
            self.pool.clone(),
            notifier.clone(),
            self.token.clone(),
        ));

        match tokio::time::timeout(timeout, self.pool.connect(&self.relays, &self.token)).await {
            Ok(result) => result,
            Err(_) => {
                let open = self.pool.open_count();
                tracing::debug!(open, ?timeout, "relay connect timed out");
                if open == 0 {
                    Err(ConnectionError::NoneEstablished {
                        attempted: self.relays.len(),
                    })
                } else {
                    Ok(open)
                }
            }
        }
    }

    /// Subscribe and feed matching events into this session's registry.
    pub fn spawn_ingest(&self, filter: DiscoveryFilter) {
        let subscription = subscribe(&self.pool, filter, self.token.clone());
        tokio::spawn(ingest_loop(
            subscription,
            self.registry.clone(),
            self.token.clone(),
        ));
    }

    /// Cancel the token and drop every relay connection.
    pub fn cancel(&self) {
        self.token.cancel();
        self.pool.dispose();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn relays(&self) -> &[RelayUrl] {
        &self.relays
    }

    pub fn pool(&self) -> &RelayPool {
        &self.pool
    }

    pub fn registry(&self) -> &CandidateRegistry {
        &self.registry
    }
}

async fn ingest_loop(
    mut subscription: Subscription,
    registry: CandidateRegistry,
    token: CancellationToken,
) {
    tracing::debug!(sub = subscription.id(), "ingest loop started");

    while let Some(event) = subscription.next().await {
        if token.is_cancelled() {
            break;
        }
        let pubkey = event.short_pubkey().to_string();
        let created_at = event.created_at;
        if registry.ingest(event) {
            tracing::debug!(pubkey = %pubkey, created_at, "candidate updated");
        } else {
            tracing::trace!(pubkey = %pubkey, created_at, "stale or repeated announcement");
        }
    }

    tracing::debug!(sub = subscription.id(), "ingest loop finished");
}

async fn forward_relay_states(pool: RelayPool, notifier: StateNotifier, token: CancellationToken) {
    let mut states = pool.state_changes();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,

            change = states.recv() => match change {
                Ok((endpoint, state)) => {
                    tracing::debug!(relay = %endpoint, %state, "relay state changed");
                    notifier.notify(StateEvent::RelayStateChanged { endpoint, state });
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
        }
    }
}
