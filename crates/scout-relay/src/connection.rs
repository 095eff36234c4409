//! One relay connection.
//!
//! Each relay is driven by its own task:
//!
//!   Connecting ──► Open ──► Closed ──(reconnect delay)──► Connecting ...
//!
//! The task ends only when its token is cancelled, either by an explicit
//! close of this relay or by disposal of the owning pool. Outbound frames
//! queued while the relay is down are discarded; active subscriptions are
//! re-sent from the pool's subscription table every time the socket opens.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use scout_core::{RelayMessage, RelayUrl};

/// Lifecycle of a single relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Channels shared by every connection of a pool.
#[derive(Clone)]
pub(crate) struct Shared {
    pub messages: broadcast::Sender<(RelayUrl, RelayMessage)>,
    pub states: broadcast::Sender<(RelayUrl, ConnectionState)>,
    /// Subscription id → REQ frame, replayed on every (re)connect.
    pub subscriptions: Arc<DashMap<String, String>>,
    pub reconnect_delay: Duration,
}

/// Pool-side handle on a running connection task.
pub(crate) struct RelayHandle {
    commands: mpsc::UnboundedSender<String>,
    state: watch::Receiver<ConnectionState>,
    token: CancellationToken,
}

impl RelayHandle {
    pub fn spawn(url: RelayUrl, shared: Shared, parent: &CancellationToken) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);
        let token = parent.child_token();

        tokio::spawn(run(url, shared, rx, state_tx, token.clone()));

        Self {
            commands,
            state,
            token,
        }
    }

    /// Queue a text frame. Dropped silently if the task has ended.
    pub fn send(&self, frame: String) {
        let _ = self.commands.send(frame);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the task for good. No reconnect follows.
    pub fn close(&self) {
        self.token.cancel();
    }
}

async fn run(
    url: RelayUrl,
    shared: Shared,
    mut commands: mpsc::UnboundedReceiver<String>,
    state: watch::Sender<ConnectionState>,
    token: CancellationToken,
) {
    let publish = |s: ConnectionState| {
        state.send_replace(s);
        let _ = shared.states.send((url.clone(), s));
    };

    loop {
        publish(ConnectionState::Connecting);

        let connected = tokio::select! {
            _ = token.cancelled() => break,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((ws, _)) => {
                tracing::info!(relay = %url, "relay connected");
                publish(ConnectionState::Open);

                match pump(&url, ws, &shared, &mut commands, &token).await {
                    Ok(()) => tracing::info!(relay = %url, "relay connection closed"),
                    Err(e) => tracing::warn!(relay = %url, error = %e, "relay connection dropped"),
                }
                publish(ConnectionState::Closed);
            }
            Err(e) => {
                tracing::warn!(relay = %url, error = %e, "relay connect failed");
                publish(ConnectionState::Closed);
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(shared.reconnect_delay) => {
                tracing::debug!(relay = %url, "reconnecting");
            }
        }
    }

    if *state.borrow() != ConnectionState::Closed {
        publish(ConnectionState::Closed);
    }
    tracing::debug!(relay = %url, "relay task finished");
}

/// Drive an open socket until it closes, fails, or the token is cancelled.
async fn pump(
    url: &RelayUrl,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    shared: &Shared,
    commands: &mut mpsc::UnboundedReceiver<String>,
    token: &CancellationToken,
) -> Result<(), tungstenite::Error> {
    let (mut tx, mut rx) = ws.split();

    // Stale frames from while the relay was down; the replay below covers REQs.
    while commands.try_recv().is_ok() {}

    let replay: Vec<String> = shared
        .subscriptions
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    for frame in replay {
        tracing::trace!(relay = %url, frame = %frame, "replaying subscription");
        tx.send(Message::Text(frame.into())).await?;
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                let _ = tx.send(Message::Close(None)).await;
                return Ok(());
            }

            cmd = commands.recv() => match cmd {
                Some(frame) => {
                    tracing::trace!(relay = %url, frame = %frame, "send");
                    tx.send(Message::Text(frame.into())).await?;
                }
                None => {
                    let _ = tx.close().await;
                    return Ok(());
                }
            },

            msg = rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match RelayMessage::parse(text.as_str()) {
                    Ok(message) => {
                        let _ = shared.messages.send((url.clone(), message));
                    }
                    Err(e) => {
                        tracing::debug!(relay = %url, error = %e, "ignoring relay frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(relay = %url, frame = ?frame, "relay sent close");
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            },
        }
    }
}
