//! Realtime updates held across an in-flight fetch.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::RealtimeUpdate;

/// Bounded queue of updates received while a full fetch was running.
///
/// When the fetch commits, entries not older than its initiation time are
/// re-applied on top of the fetched data; older entries are dropped.
#[derive(Debug)]
pub(crate) struct PendingLedger {
    entries: VecDeque<RealtimeUpdate>,
    capacity: usize,
}

impl PendingLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record an update, evicting the oldest arrival when full.
    pub fn push(&mut self, update: RealtimeUpdate) {
        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                warn!(
                    station = %evicted.station_id,
                    capacity = self.capacity,
                    "pending realtime ledger full, evicting oldest update"
                );
            }
        }
        self.entries.push_back(update);
    }

    /// Remove and return every entry not older than `started_at`, in
    /// arrival order. Older entries are discarded.
    pub fn drain_since(&mut self, started_at: DateTime<Utc>) -> Vec<RealtimeUpdate> {
        self.entries
            .drain(..)
            .filter(|u| u.timestamp >= started_at)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
