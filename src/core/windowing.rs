//! Windowed event counting.
//!
//! Events are bucketed into aligned, fixed-duration windows (default 5
//! seconds) per page key. Each (key, window) pair owns one atomic counter,
//! so concurrent writers only contend on the entry they are incrementing
//! and readers never block ingestion.

use crate::event::PageEvent;
use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// One (key, window, count) entry returned by a range scan.
///
/// The count is a point-in-time atomic load; entries from the same scan may
/// reflect slightly different read times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowedCount {
    /// Page key the counter belongs to
    pub key: String,
    /// Start instant of the aligned window
    pub window_start: DateTime<Utc>,
    /// Events recorded in this window so far
    pub count: u64,
}

/// Errors from the windowed store.
///
/// The in-memory counter itself cannot fail, but callers (the snapshot
/// query, the publisher tick) are written against this so a durable store
/// behind the same interface degrades to a skipped tick, not a crash.
#[derive(Debug)]
pub enum StoreError {
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Point-in-time view of the store's activity counters.
#[derive(Debug, Clone, Serialize)]
pub struct CounterStats {
    /// Events accepted into some window
    pub events_recorded: u64,
    /// Events dropped because they predate the retention horizon
    pub events_dropped: u64,
    /// Windows removed by retention eviction
    pub windows_evicted: u64,
}

#[derive(Debug, Default)]
struct StoreStats {
    events_recorded: AtomicU64,
    events_dropped: AtomicU64,
    windows_evicted: AtomicU64,
}

/// Per-key, per-window event counter.
///
/// Counting policy: each recorded event increments its (key, window) entry
/// by exactly 1; the event's duration value is carried on the event but
/// never summed into the counter.
pub struct WindowedCounter {
    /// Window width in milliseconds; windows are aligned to multiples of
    /// this from the epoch
    window_ms: i64,
    /// Age beyond which windows are dropped and late events rejected
    retention: Duration,
    /// (key, window start millis) -> count
    entries: DashMap<(String, i64), AtomicU64>,
    stats: StoreStats,
}

impl WindowedCounter {
    /// Create a counter with the given window width and retention horizon.
    pub fn new(window: std::time::Duration, retention: std::time::Duration) -> Self {
        let window_ms = (window.as_millis() as i64).max(1);
        Self {
            window_ms,
            retention: Duration::milliseconds(retention.as_millis() as i64),
            entries: DashMap::new(),
            stats: StoreStats::default(),
        }
    }

    /// Aligned start (epoch millis) of the window containing `timestamp`.
    fn window_start_ms(&self, timestamp: DateTime<Utc>) -> i64 {
        timestamp.timestamp_millis().div_euclid(self.window_ms) * self.window_ms
    }

    /// Record one event into the window containing its timestamp.
    ///
    /// An event older than the retention horizon is dropped and counted in
    /// [`CounterStats::events_dropped`]; this is not an error condition.
    pub fn record(&self, event: &PageEvent) {
        let now = Utc::now();
        if event.timestamp < now - self.retention {
            self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                key = %event.key,
                timestamp = %event.timestamp,
                "dropping event older than retention horizon"
            );
            return;
        }

        let start = self.window_start_ms(event.timestamp);
        self.entries
            .entry((event.key.clone(), start))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
        self.stats.events_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Scan all entries whose window starts within `[from, to)`.
    ///
    /// Windows are selected by start time, so a window stops matching a
    /// trailing range one window-width after it opens, not after it closes.
    ///
    /// Copy-on-read: results are detached from the live map, so concurrent
    /// `record` calls and eviction never invalidate them. Each count is one
    /// atomic load; no torn reads, but no global consistent cut either.
    pub fn fetch_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WindowedCount>, StoreError> {
        let from_ms = from.timestamp_millis();
        let to_ms = to.timestamp_millis();

        let mut out = Vec::new();
        for entry in self.entries.iter() {
            let (key, start) = entry.key();
            if from_ms <= *start && *start < to_ms {
                let start_ts = Utc
                    .timestamp_millis_opt(*start)
                    .single()
                    .ok_or_else(|| StoreError::Unavailable("window start out of range".into()))?;
                out.push(WindowedCount {
                    key: key.clone(),
                    window_start: start_ts,
                    count: entry.value().load(Ordering::Relaxed),
                });
            }
        }
        Ok(out)
    }

    /// Drop windows that ended before `now - retention`.
    pub fn evict_expired(&self, now: DateTime<Utc>) {
        let cutoff_ms = (now - self.retention).timestamp_millis();
        let window_ms = self.window_ms;
        let before = self.entries.len();
        self.entries
            .retain(|(_, start), _| start + window_ms > cutoff_ms);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            self.stats
                .windows_evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(evicted, "evicted expired windows");
        }
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> CounterStats {
        CounterStats {
            events_recorded: self.stats.events_recorded.load(Ordering::Relaxed),
            events_dropped: self.stats.events_dropped.load(Ordering::Relaxed),
            windows_evicted: self.stats.windows_evicted.load(Ordering::Relaxed),
        }
    }

    /// Number of live (key, window) entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
