//! Periodic snapshot publishing.
//!
//! A single timer task computes one snapshot per tick and fans it out to
//! every active subscriber over a broadcast channel. Slow subscribers have
//! their undelivered ticks dropped; they never block the tick loop or
//! other subscribers.

use crate::core::{Snapshot, SnapshotQuery};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

/// Undelivered ticks buffered per subscriber before old ones are dropped.
const TICK_BUFFER: usize = 8;

/// Lifecycle of the publisher's tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    /// No tick task yet; starts on first subscribe
    Idle,
    /// Tick task active. The publisher stays running after the last
    /// unsubscribe, keeping the loop warm for the next viewer.
    Running,
    /// Stopped for good; existing subscriber streams end
    Stopped,
}

/// Returned by [`AnalyticsStreamPublisher::subscribe`] after `stop()`.
#[derive(Debug)]
pub struct PublisherStopped;

impl std::fmt::Display for PublisherStopped {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "publisher is stopped")
    }
}

impl std::error::Error for PublisherStopped {}

struct Inner {
    state: PublisherState,
    tx: Option<broadcast::Sender<Snapshot>>,
    task: Option<JoinHandle<()>>,
}

/// Timer-driven fan-out of trailing-window snapshots.
pub struct AnalyticsStreamPublisher {
    query: SnapshotQuery,
    tick_interval: Duration,
    window_secs: u64,
    inner: Mutex<Inner>,
}

impl AnalyticsStreamPublisher {
    /// Create a publisher that snapshots the trailing `window_secs` seconds
    /// every `tick_interval`.
    pub fn new(query: SnapshotQuery, tick_interval: Duration, window_secs: u64) -> Self {
        Self {
            query,
            tick_interval,
            window_secs,
            inner: Mutex::new(Inner {
                state: PublisherState::Idle,
                tx: None,
                task: None,
            }),
        }
    }

    /// Register a subscriber, starting the tick loop on first use.
    pub fn subscribe(&self) -> Result<AnalyticsSubscription, PublisherStopped> {
        let mut inner = self.inner.lock().expect("publisher lock poisoned");
        match inner.state {
            PublisherState::Stopped => Err(PublisherStopped),
            PublisherState::Running => {
                let tx = inner.tx.as_ref().expect("running publisher has a sender");
                Ok(AnalyticsSubscription::new(tx.subscribe()))
            }
            PublisherState::Idle => {
                let (tx, rx) = broadcast::channel(TICK_BUFFER);
                inner.task = Some(self.spawn_tick_loop(tx.clone()));
                inner.tx = Some(tx);
                inner.state = PublisherState::Running;
                Ok(AnalyticsSubscription::new(rx))
            }
        }
    }

    /// Stop the tick loop and end every subscriber stream.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().expect("publisher lock poisoned");
        if inner.state == PublisherState::Stopped {
            return;
        }
        inner.state = PublisherState::Stopped;
        inner.tx = None;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        tracing::info!("analytics publisher stopped");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PublisherState {
        self.inner.lock().expect("publisher lock poisoned").state
    }

    fn spawn_tick_loop(&self, tx: broadcast::Sender<Snapshot>) -> JoinHandle<()> {
        let query = self.query.clone();
        let tick_interval = self.tick_interval;
        let window_secs = self.window_secs;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first interval tick fires immediately; skip it so
            // subscribers see full intervals between snapshots.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                // One computation per tick, shared by all subscribers
                match query.snapshot(window_secs) {
                    Ok(snapshot) => {
                        // Err means no subscriber is listening right now
                        let _ = tx.send(snapshot);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "snapshot failed, skipping tick");
                    }
                }
            }
        })
    }
}

impl Drop for AnalyticsStreamPublisher {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(task) = inner.task.take() {
                task.abort();
            }
        }
    }
}

/// Handle to the per-tick snapshot feed of one subscriber.
pub struct AnalyticsSubscription {
    id: Uuid,
    rx: broadcast::Receiver<Snapshot>,
}

impl AnalyticsSubscription {
    fn new(rx: broadcast::Receiver<Snapshot>) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(subscription = %id, "analytics subscriber registered");
        Self { id, rx }
    }

    /// Identifier for this subscription, used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next snapshot.
    ///
    /// Ticks missed while lagging are dropped, not replayed. Returns `None`
    /// once the publisher has stopped.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        subscription = %self.id,
                        missed,
                        "slow subscriber, dropping missed ticks"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Turn the subscription into a stream of snapshots, ending when the
    /// publisher stops. Lag gaps are silently skipped. Dropping the stream
    /// cancels the subscription, same as dropping the handle itself.
    pub fn into_stream(self) -> impl Stream<Item = Snapshot> {
        let id = self.id;
        BroadcastStream::new(self.rx).filter_map(move |item| match item {
            Ok(snapshot) => Some(snapshot),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                tracing::warn!(subscription = %id, missed, "slow subscriber, dropping missed ticks");
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WindowedCounter;
    use crate::event::PageEvent;
    use std::sync::Arc;
    use std::time::Duration;

    fn publisher_with_store(tick: Duration) -> (Arc<WindowedCounter>, AnalyticsStreamPublisher) {
        let store = Arc::new(WindowedCounter::new(
            Duration::from_secs(5),
            Duration::from_secs(120),
        ));
        let query = SnapshotQuery::new(Arc::clone(&store));
        // A wide trailing range keeps just-recorded events visible on
        // every tick, whatever the wall-clock window alignment
        (store, AnalyticsStreamPublisher::new(query, tick, 60))
    }

    async fn next_with_timeout(sub: &mut AnalyticsSubscription) -> Option<Snapshot> {
        tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("timed out waiting for tick")
    }

    #[tokio::test]
    async fn test_subscriber_receives_ticks() {
        let (store, publisher) = publisher_with_store(Duration::from_millis(20));
        store.record(&PageEvent::new("home", "U1", 100));

        let mut sub = publisher.subscribe().unwrap();
        assert_eq!(publisher.state(), PublisherState::Running);

        let snapshot = next_with_timeout(&mut sub).await.unwrap();
        assert_eq!(snapshot.counts.get("home"), Some(&1));
    }

    #[tokio::test]
    async fn test_one_snapshot_fanned_out_to_all() {
        let (store, publisher) = publisher_with_store(Duration::from_millis(20));
        store.record(&PageEvent::new("home", "U1", 100));

        let mut first = publisher.subscribe().unwrap();
        let mut second = publisher.subscribe().unwrap();

        let a = next_with_timeout(&mut first).await.unwrap();
        let b = next_with_timeout(&mut second).await.unwrap();

        // Same tick, same computed snapshot
        assert_eq!(a.to, b.to);
        assert_eq!(a.counts, b.counts);
    }

    #[tokio::test]
    async fn test_cancelled_subscriber_does_not_affect_others() {
        let (store, publisher) = publisher_with_store(Duration::from_millis(20));
        store.record(&PageEvent::new("home", "U1", 100));

        let cancelled = publisher.subscribe().unwrap();
        let mut active = publisher.subscribe().unwrap();
        drop(cancelled);

        // The surviving subscriber keeps receiving at the same cadence
        for _ in 0..3 {
            assert!(next_with_timeout(&mut active).await.is_some());
        }
        assert_eq!(publisher.state(), PublisherState::Running);
    }

    #[tokio::test]
    async fn test_stop_ends_subscriber_streams() {
        let (_store, publisher) = publisher_with_store(Duration::from_millis(20));
        let mut sub = publisher.subscribe().unwrap();

        publisher.stop();
        assert_eq!(publisher.state(), PublisherState::Stopped);
        assert!(publisher.subscribe().is_err());

        // Drain anything already buffered; the stream must then end
        loop {
            match tokio::time::timeout(Duration::from_secs(2), sub.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => panic!("stream did not end after stop"),
            }
        }
    }

    #[tokio::test]
    async fn test_into_stream_after_recv() {
        let (store, publisher) = publisher_with_store(Duration::from_millis(20));
        store.record(&PageEvent::new("home", "U1", 100));

        let mut sub = publisher.subscribe().unwrap();
        assert!(next_with_timeout(&mut sub).await.is_some());

        // The same subscription handle continues as a stream
        let mut stream = Box::pin(sub.into_stream());
        let snapshot = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for tick")
            .unwrap();
        assert_eq!(snapshot.counts.get("home"), Some(&1));
    }

    #[tokio::test]
    async fn test_stream_yields_snapshots() {
        let (store, publisher) = publisher_with_store(Duration::from_millis(20));
        store.record(&PageEvent::new("docs", "U2", 100));

        let sub = publisher.subscribe().unwrap();
        let mut stream = Box::pin(sub.into_stream());

        let snapshot = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for tick")
            .unwrap();
        assert_eq!(snapshot.counts.get("docs"), Some(&1));
    }
}
