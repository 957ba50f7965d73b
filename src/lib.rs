//! Pageview Analytics - windowed page-view counting with a live feed.
//!
//! This library ingests named page-view events, buckets them into aligned
//! time windows per page key, and publishes the trailing-window counts to
//! subscribers once per second.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Pageview Analytics                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌────────────────┐   ┌─────────────────┐   │
//! │  │  Ingest   │──▶│   Windowed     │◀──│    Snapshot     │   │
//! │  │  Gateway  │   │   Counter      │   │     Query       │   │
//! │  └───────────┘   │  (5s buckets)  │   └─────────────────┘   │
//! │        ▲         └────────────────┘            ▲            │
//! │        │                                       │            │
//! │  ┌───────────┐                         ┌─────────────────┐  │
//! │  │   HTTP    │                         │    Analytics    │  │
//! │  │  /publish │                         │    Publisher    │  │
//! │  │  /ingest  │                         │  (1s ticks,SSE) │  │
//! │  └───────────┘                         └─────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pageview_analytics::{
//!     AnalyticsStreamPublisher, EventIngestGateway, PageEvent, SnapshotQuery, WindowedCounter,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main] async fn main() {
//! let store = Arc::new(WindowedCounter::new(
//!     Duration::from_secs(5),
//!     Duration::from_secs(60),
//! ));
//! store.record(&PageEvent::new("home", "U1", 250));
//!
//! let query = SnapshotQuery::new(Arc::clone(&store));
//! let publisher = AnalyticsStreamPublisher::new(query, Duration::from_secs(1), 5);
//!
//! let mut subscription = publisher.subscribe().unwrap();
//! while let Some(snapshot) = subscription.recv().await {
//!     println!("{:?}", snapshot.counts);
//! }
//! # }
//! ```

pub mod config;
pub mod core;
pub mod event;
pub mod ingest;
pub mod publisher;
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{CounterStats, Snapshot, SnapshotQuery, StoreError, WindowedCount, WindowedCounter};
pub use event::PageEvent;
pub use ingest::{EventIngestGateway, IngestError};
pub use publisher::{AnalyticsStreamPublisher, AnalyticsSubscription, PublisherState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
