//! Core aggregation for the analytics pipeline.
//!
//! This module contains:
//! - Windowed per-key event counting
//! - Snapshot queries that fold windows into key -> count maps

pub mod query;
pub mod windowing;

// Re-export commonly used types
pub use query::{Snapshot, SnapshotQuery};
pub use windowing::{CounterStats, StoreError, WindowedCount, WindowedCounter};
