//! Snapshot queries over the windowed counter.
//!
//! A snapshot folds every (key, window) entry overlapping a time range
//! into a single count per key. Snapshots are transient reads; they hold
//! no state and are recomputed fresh on every call.

use crate::core::windowing::{StoreError, WindowedCounter};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Key -> aggregate count mapping valid for the `[from, to)` range.
///
/// Keys with zero events in range are omitted, never present with a 0.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Start of the queried range (inclusive)
    pub from: DateTime<Utc>,
    /// End of the queried range (exclusive)
    pub to: DateTime<Utc>,
    /// Aggregate event count per page key
    pub counts: HashMap<String, u64>,
}

/// Read-only view that turns a trailing time range into a [`Snapshot`].
#[derive(Clone)]
pub struct SnapshotQuery {
    store: Arc<WindowedCounter>,
}

impl SnapshotQuery {
    pub fn new(store: Arc<WindowedCounter>) -> Self {
        Self { store }
    }

    /// Aggregate counts over the trailing `window_secs` seconds, ending now.
    pub fn snapshot(&self, window_secs: u64) -> Result<Snapshot, StoreError> {
        let to = Utc::now();
        let from = to - Duration::seconds(window_secs as i64);
        self.snapshot_range(from, to)
    }

    /// Aggregate counts over an explicit `[from, to)` range.
    pub fn snapshot_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Snapshot, StoreError> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in self.store.fetch_range(from, to)? {
            if entry.count > 0 {
                *counts.entry(entry.key).or_insert(0) += entry.count;
            }
        }
        Ok(Snapshot { from, to, counts })
    }
}
