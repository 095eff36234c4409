//! Live event subscription over a relay pool.
//!
//! The REQ goes out on the first call to `next()`. From then on every EVENT
//! frame addressed to this subscription is checked against the filter and
//! its id and signature are verified; only events passing both are yielded.
//! Duplicates across relays are passed through; de-duplication is the
//! registry's job.
//!
//! If the receiver falls behind the pool's message buffer, the REQ is sent
//! again so relays replay their stored events.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use rand::Rng;
use scout_core::{ClientMessage, DiscoveryEvent, DiscoveryFilter, RelayMessage, RelayUrl};

use crate::pool::RelayPool;

/// Open-ended stream of matching events. Ends when `token` is cancelled or
/// the pool is disposed, and cannot be restarted afterwards.
pub struct Subscription {
    id: String,
    pool: RelayPool,
    filter: DiscoveryFilter,
    token: CancellationToken,
    messages: broadcast::Receiver<(RelayUrl, RelayMessage)>,
    started: bool,
    finished: bool,
}

/// Create a subscription for `filter` on every relay in `pool`.
pub fn subscribe(pool: &RelayPool, filter: DiscoveryFilter, token: CancellationToken) -> Subscription {
    let id = format!("scout-{:016x}", rand::thread_rng().gen::<u64>());
    Subscription {
        id,
        messages: pool.messages(),
        pool: pool.clone(),
        filter,
        token,
        started: false,
        finished: false,
    }
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next matching event, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<DiscoveryEvent> {
        if self.finished {
            return None;
        }
        if !self.started {
            self.started = true;
            self.request();
            tracing::debug!(sub = %self.id, networks = ?self.filter.networks(), "subscription opened");
        }

        let pool_token = self.pool.token().clone();
        loop {
            let received = tokio::select! {
                biased;
                _ = self.token.cancelled() => None,
                _ = pool_token.cancelled() => None,
                msg = self.messages.recv() => Some(msg),
            };

            let Some(received) = received else {
                self.finish();
                return None;
            };

            match received {
                Ok((relay, RelayMessage::Event { subscription_id, event })) => {
                    if subscription_id != self.id {
                        continue;
                    }
                    if !self.filter.matches(&event) {
                        tracing::debug!(
                            relay = %relay,
                            pubkey = event.short_pubkey(),
                            "dropping event that fails the discovery filter"
                        );
                        continue;
                    }
                    match event.verify() {
                        Ok(()) => return Some(event),
                        Err(e) => tracing::warn!(
                            relay = %relay,
                            pubkey = event.short_pubkey(),
                            error = %e,
                            "dropping forged event"
                        ),
                    }
                }
                Ok((relay, RelayMessage::EndOfStoredEvents { subscription_id })) if subscription_id == self.id => {
                    tracing::debug!(relay = %relay, sub = %self.id, "end of stored events");
                }
                Ok((relay, RelayMessage::Closed { subscription_id, message })) if subscription_id == self.id => {
                    tracing::warn!(relay = %relay, reason = %message, "relay closed subscription");
                }
                Ok((relay, RelayMessage::Notice { message })) => {
                    tracing::debug!(relay = %relay, notice = %message, "relay notice");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(sub = %self.id, skipped, "subscription lagged behind relay traffic, re-requesting");
                    self.request();
                }
                Err(RecvError::Closed) => {
                    self.finish();
                    return None;
                }
            }
        }
    }

    fn request(&self) {
        self.pool.send(&ClientMessage::Req {
            subscription_id: self.id.clone(),
            filters: vec![self.filter.to_wire()],
        });
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.started {
            self.pool.send(&ClientMessage::Close {
                subscription_id: self.id.clone(),
            });
            tracing::debug!(sub = %self.id, "subscription closed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.finish();
    }
}
