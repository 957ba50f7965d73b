//! Page-view event types.
//!
//! A [`PageEvent`] records a single occurrence: which page was viewed, by
//! whom, when, and for how long. Events are immutable once created; the
//! ingest path builds them and the windowed store only ever reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single page-view occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEvent {
    /// Page identifier the event is counted under
    pub key: String,
    /// Originating user
    pub user: String,
    /// When the view occurred
    pub timestamp: DateTime<Utc>,
    /// View duration in milliseconds
    pub value: u64,
}

impl PageEvent {
    /// Create an event timestamped now.
    pub fn new(key: impl Into<String>, user: impl Into<String>, value: u64) -> Self {
        Self {
            key: key.into(),
            user: user.into(),
            timestamp: Utc::now(),
            value,
        }
    }

    /// Create an event with an explicit timestamp.
    pub fn at(
        key: impl Into<String>,
        user: impl Into<String>,
        timestamp: DateTime<Utc>,
        value: u64,
    ) -> Self {
        Self {
            key: key.into(),
            user: user.into(),
            timestamp,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = PageEvent::new("home", "U1", 250);
        assert_eq!(event.key, "home");
        assert_eq!(event.user, "U1");
        assert_eq!(event.value, 250);
    }

    #[test]
    fn test_event_json_round_trip() {
        let event = PageEvent::new("checkout", "U2", 42);
        let json = serde_json::to_string(&event).unwrap();
        let parsed: PageEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.key, event.key);
        assert_eq!(parsed.timestamp, event.timestamp);
    }
}
