//! Candidate registry — newest announcement per coordinator identity.
//!
//! Rule per publisher key:
//! - first event: stored
//! - same event id as stored: ignored
//! - strictly older `created_at`: ignored
//! - otherwise (newer, or equal timestamp with another id): replaces
//!
//! The entry API holds the shard lock for the whole compare-and-replace, so
//! concurrent ingestion for one key is serialized. Entries are never removed
//! during a session; `clear` resets the whole set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use scout_core::DiscoveryEvent;

use crate::notify::{StateEvent, StateNotifier};

#[derive(Debug, Clone)]
struct Slot {
    event: DiscoveryEvent,
    /// Arrival order of the first event from this publisher.
    first_seen: u64,
}

#[derive(Clone)]
pub struct CandidateRegistry {
    entries: Arc<DashMap<String, Slot>>,
    arrivals: Arc<AtomicU64>,
    notifier: Option<StateNotifier>,
}

impl Default for CandidateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            arrivals: Arc::new(AtomicU64::new(0)),
            notifier: None,
        }
    }

    /// Registry that publishes `CandidatesChanged` on every visible change.
    pub fn with_notifier(notifier: StateNotifier) -> Self {
        Self {
            notifier: Some(notifier),
            ..Self::new()
        }
    }

    /// Apply one event. Returns true if the visible set changed.
    pub fn ingest(&self, event: DiscoveryEvent) -> bool {
        let changed = match self.entries.entry(event.pubkey.clone()) {
            Entry::Occupied(mut slot) => {
                let current = &slot.get().event;
                if current.id == event.id || event.created_at < current.created_at {
                    false
                } else {
                    slot.get_mut().event = event;
                    true
                }
            }
            Entry::Vacant(vacant) => {
                let first_seen = self.arrivals.fetch_add(1, Ordering::Relaxed);
                vacant.insert(Slot { event, first_seen });
                true
            }
        };

        if changed {
            if let Some(notifier) = &self.notifier {
                notifier.notify(StateEvent::CandidatesChanged);
            }
        }
        changed
    }

    /// Current candidates, in the order their publishers were first seen.
    pub fn snapshot(&self) -> Vec<DiscoveryEvent> {
        let mut slots: Vec<Slot> = self.entries.iter().map(|e| e.value().clone()).collect();
        slots.sort_by_key(|s| s.first_seen);
        slots.into_iter().map(|s| s.event).collect()
    }

    pub fn get(&self, pubkey: &str) -> Option<DiscoveryEvent> {
        self.entries.get(pubkey).map(|e| e.value().event.clone())
    }

    /// Candidates whose publisher key starts with `prefix` (case-insensitive).
    pub fn find_by_prefix(&self, prefix: &str) -> Vec<DiscoveryEvent> {
        let prefix = prefix.to_ascii_lowercase();
        self.snapshot()
            .into_iter()
            .filter(|e| e.pubkey.to_ascii_lowercase().starts_with(&prefix))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        let had_entries = !self.entries.is_empty();
        self.entries.clear();
        if had_entries {
            if let Some(notifier) = &self.notifier {
                notifier.notify(StateEvent::CandidatesChanged);
            }
        }
    }
}
