//! Application-wide busy gate.
//!
//! Detection, config writes, discovery start and verification run one at a
//! time, in arrival order. Every transition is published as `BusyChanged` so a
//! shell can show a spinner: on acquire before waiting, on release after the
//! permit has been handed on.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::notify::{StateEvent, StateNotifier};

#[derive(Clone)]
pub struct LoadingGate {
    permits: Arc<Semaphore>,
    notifier: StateNotifier,
}

/// Held for the duration of a gated operation.
pub struct GateGuard {
    permit: Option<OwnedSemaphorePermit>,
    permits: Arc<Semaphore>,
    notifier: StateNotifier,
}

impl LoadingGate {
    pub fn new(notifier: StateNotifier) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
            notifier,
        }
    }

    pub async fn acquire(&self) -> GateGuard {
        self.notifier.notify(StateEvent::BusyChanged { busy: true });
        // The semaphore is never closed, so this only fails if that changes.
        let permit = self.permits.clone().acquire_owned().await.ok();
        GateGuard {
            permit,
            permits: self.permits.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        drop(self.permit.take());
        // A queued waiter takes the permit over directly, so the gate may still be busy.
        let busy = self.permits.available_permits() == 0;
        self.notifier.notify(StateEvent::BusyChanged { busy });
    }
}
