//! Relay pool: the set of relay connections behind one discovery session.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use scout_core::{ClientMessage, RelayMessage, RelayUrl};

use crate::connection::{ConnectionState, RelayHandle, Shared};

/// Inbound frames buffered per receiver before it starts lagging.
const MESSAGE_CAPACITY: usize = 1024;
const STATE_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("no relay connection could be established ({attempted} attempted)")]
    NoneEstablished { attempted: usize },

    #[error("relay pool has been disposed")]
    Cancelled,
}

/// Cheaply cloneable handle; every clone drives the same connections.
#[derive(Clone)]
pub struct RelayPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    relays: DashMap<RelayUrl, RelayHandle>,
    shared: Shared,
    token: CancellationToken,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl RelayPool {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self::with_capacity(reconnect_delay, MESSAGE_CAPACITY)
    }

    /// Like `new`, buffering `message_capacity` inbound frames per receiver.
    pub fn with_capacity(reconnect_delay: Duration, message_capacity: usize) -> Self {
        let (messages, _) = broadcast::channel(message_capacity);
        let (states, _) = broadcast::channel(STATE_CAPACITY);
        Self {
            inner: Arc::new(PoolInner {
                relays: DashMap::new(),
                shared: Shared {
                    messages,
                    states,
                    subscriptions: Arc::new(DashMap::new()),
                    reconnect_delay,
                },
                token: CancellationToken::new(),
            }),
        }
    }

    /// Open connections to `endpoints` and wait for them.
    ///
    /// Returns once every endpoint is open, or when `token` is cancelled, with
    /// the number of open connections at that point. Relays that are still
    /// down keep retrying in the background.
    pub async fn connect(
        &self,
        endpoints: &[RelayUrl],
        token: &CancellationToken,
    ) -> Result<usize, ConnectionError> {
        if self.is_disposed() {
            return Err(ConnectionError::Cancelled);
        }

        let mut seen = HashSet::new();
        let watches: Vec<_> = endpoints
            .iter()
            .filter(|url| seen.insert((*url).clone()))
            .map(|url| {
                self.inner
                    .relays
                    .entry(url.clone())
                    .or_insert_with(|| {
                        tracing::debug!(relay = %url, "adding relay");
                        RelayHandle::spawn(url.clone(), self.inner.shared.clone(), &self.inner.token)
                    })
                    .watch_state()
            })
            .collect();

        let all_open = futures_util::future::join_all(watches.iter().cloned().map(|mut rx| async move {
            rx.wait_for(|s| *s == ConnectionState::Open).await.is_ok()
        }));

        tokio::select! {
            _ = token.cancelled() => {}
            _ = self.inner.token.cancelled() => {}
            _ = all_open => {}
        }

        if self.is_disposed() {
            return Err(ConnectionError::Cancelled);
        }

        let open = watches
            .iter()
            .filter(|rx| *rx.borrow() == ConnectionState::Open)
            .count();
        tracing::info!(open, attempted = watches.len(), "relay connect finished");

        if open == 0 {
            Err(ConnectionError::NoneEstablished {
                attempted: watches.len(),
            })
        } else {
            Ok(open)
        }
    }

    /// Send a frame to every relay. A REQ is remembered and replayed after
    /// reconnects until the matching CLOSE is sent.
    pub fn send(&self, message: &ClientMessage) {
        if self.is_disposed() {
            return;
        }
        let frame = message.to_json();
        match message {
            ClientMessage::Req {
                subscription_id, ..
            } => {
                self.inner
                    .shared
                    .subscriptions
                    .insert(subscription_id.clone(), frame.clone());
            }
            ClientMessage::Close { subscription_id } => {
                self.inner.shared.subscriptions.remove(subscription_id);
            }
        }
        for relay in self.inner.relays.iter() {
            relay.value().send(frame.clone());
        }
    }

    /// Close one relay permanently.
    pub fn close(&self, endpoint: &RelayUrl) {
        if let Some((_, handle)) = self.inner.relays.remove(endpoint) {
            handle.close();
            tracing::info!(relay = %endpoint, "relay closed");
        }
    }

    /// Close every relay and stop reconnecting. Idempotent.
    pub fn dispose(&self) {
        if self.inner.token.is_cancelled() {
            return;
        }
        self.inner.token.cancel();
        self.inner.relays.clear();
        self.inner.shared.subscriptions.clear();
        tracing::info!("relay pool disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Relay lifecycle changes, as `(endpoint, state)`.
    pub fn state_changes(&self) -> broadcast::Receiver<(RelayUrl, ConnectionState)> {
        self.inner.shared.states.subscribe()
    }

    /// Every parsed frame received from any relay.
    pub fn messages(&self) -> broadcast::Receiver<(RelayUrl, RelayMessage)> {
        self.inner.shared.messages.subscribe()
    }

    pub fn relays(&self) -> Vec<RelayUrl> {
        self.inner.relays.iter().map(|r| r.key().clone()).collect()
    }

    pub fn state(&self, endpoint: &RelayUrl) -> Option<ConnectionState> {
        self.inner.relays.get(endpoint).map(|r| r.value().state())
    }

    pub fn open_count(&self) -> usize {
        self.inner
            .relays
            .iter()
            .filter(|r| r.value().state() == ConnectionState::Open)
            .count()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.token
    }
}
