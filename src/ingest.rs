//! Event ingest gateway.
//!
//! Every event enters the windowed store through here, whether it arrived
//! from the outside world or was synthesized by the manual publish path.
//! The gateway validates, records, and echoes the accepted event back to
//! the caller; retrying rejected events is the transport's problem.

use crate::config::Config;
use crate::core::WindowedCounter;
use crate::event::PageEvent;
use chrono::{Duration, Utc};
use rand::Rng;
use std::sync::Arc;

/// Ingest failures.
#[derive(Debug)]
pub enum IngestError {
    /// Malformed or out-of-bounds event, rejected before recording
    Validation(String),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Validation(e) => write!(f, "validation error: {e}"),
        }
    }
}

impl std::error::Error for IngestError {}

/// Applies inbound events to the windowed counter.
#[derive(Clone)]
pub struct EventIngestGateway {
    store: Arc<WindowedCounter>,
    /// Future timestamps within this bound are accepted as clock skew
    clock_skew: Duration,
    users: Vec<String>,
    value_min: u64,
    value_max: u64,
}

impl EventIngestGateway {
    pub fn new(store: Arc<WindowedCounter>, config: &Config) -> Self {
        Self {
            store,
            clock_skew: Duration::seconds(config.clock_skew_secs as i64),
            users: config.synthetic_users.clone(),
            value_min: config.synthetic_value_min,
            value_max: config.synthetic_value_max,
        }
    }

    /// Validate an event and record it, echoing the accepted event back.
    pub fn ingest(&self, event: PageEvent) -> Result<PageEvent, IngestError> {
        if event.key.trim().is_empty() {
            return Err(IngestError::Validation("event key must not be empty".into()));
        }
        if event.user.trim().is_empty() {
            return Err(IngestError::Validation("event user must not be empty".into()));
        }
        if event.timestamp > Utc::now() + self.clock_skew {
            return Err(IngestError::Validation(format!(
                "event timestamp {} is beyond the clock skew bound",
                event.timestamp
            )));
        }

        self.store.record(&event);
        tracing::debug!(key = %event.key, user = %event.user, "event recorded");
        Ok(event)
    }

    /// Synthesize an event for `name` and push it through the ingest path.
    ///
    /// Test/debug entry point: the user is drawn from a small fixed pool and
    /// the value from a bounded range; no distribution guarantees. The topic
    /// is a channel label only, everything feeds the one in-process store.
    pub fn manual_publish(&self, name: &str, topic: &str) -> Result<PageEvent, IngestError> {
        if name.trim().is_empty() {
            return Err(IngestError::Validation("name must not be empty".into()));
        }
        if topic.trim().is_empty() {
            return Err(IngestError::Validation("topic must not be empty".into()));
        }
        if self.users.is_empty() || self.value_min >= self.value_max {
            return Err(IngestError::Validation(
                "synthetic user pool or value range is not configured".into(),
            ));
        }

        let mut rng = rand::thread_rng();
        let user = self.users[rng.gen_range(0..self.users.len())].clone();
        let value = rng.gen_range(self.value_min..self.value_max);

        tracing::info!(key = name, topic, user = %user, "publishing synthetic event");
        self.ingest(PageEvent::new(name, user, value))
    }
}
