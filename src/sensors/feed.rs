//! Sensor Feed
//!
//! Polls a source on an interval and broadcasts each round to one topic.
//! New subscribers of that topic get the most recent round as a snapshot.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::{Reading, SensorError, SensorSnapshot, SensorSource};
use crate::websocket::{Broadcaster, Envelope, TopicHandler};

/// Event tags a feed emits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEvents {
    /// Sent once to each new subscriber
    pub init: String,
    /// Broadcast after every poll
    pub update: String,
}

impl Default for FeedEvents {
    fn default() -> Self {
        Self {
            init: "init".to_string(),
            update: "update".to_string(),
        }
    }
}

impl FeedEvents {
    pub fn new(init: impl Into<String>, update: impl Into<String>) -> Self {
        Self {
            init: init.into(),
            update: update.into(),
        }
    }
}

/// Side effect run on every polled round (alerts)
#[async_trait]
pub trait ReadingObserver: Send + Sync {
    async fn observe(&self, readings: &[Reading]);
}

/// Periodic poll-and-broadcast loop for one topic
pub struct SensorFeed {
    topic: String,
    events: FeedEvents,
    source: Arc<dyn SensorSource>,
    broadcaster: Arc<Broadcaster>,
    interval: Duration,
    latest: RwLock<Vec<Reading>>,
    observers: Vec<Arc<dyn ReadingObserver>>,
}

impl SensorFeed {
    pub fn new(
        topic: impl Into<String>,
        events: FeedEvents,
        source: Arc<dyn SensorSource>,
        broadcaster: Arc<Broadcaster>,
        interval: Duration,
    ) -> Self {
        Self {
            topic: topic.into(),
            events,
            source,
            broadcaster,
            interval,
            latest: RwLock::new(Vec::new()),
            observers: Vec::new(),
        }
    }

    /// Add a side effect run after every successful poll
    pub fn with_observer(mut self, observer: Arc<dyn ReadingObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn events(&self) -> &FeedEvents {
        &self.events
    }

    /// Most recent round of readings
    pub async fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            all: self.latest.read().await.clone(),
        }
    }

    /// Poll once, broadcast the round and run observers.
    ///
    /// Returns how many subscribers received the update.
    pub async fn poll_once(&self) -> Result<usize, SensorError> {
        let readings = self.source.read_all().await?;
        let snapshot = SensorSnapshot { all: readings };
        let envelope = Envelope::from_payload(&self.events.update, &snapshot)?;

        *self.latest.write().await = snapshot.all.clone();
        let delivered = self.broadcaster.publish(&self.topic, envelope).await;

        for observer in &self.observers {
            observer.observe(&snapshot.all).await;
        }

        Ok(delivered)
    }

    /// Spawn the polling loop
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                topic = %self.topic,
                source = %self.source.name(),
                interval_ms = self.interval.as_millis() as u64,
                "Sensor feed started"
            );

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if let Err(e) = self.poll_once().await {
                    tracing::warn!(topic = %self.topic, error = %e, "Sensor poll failed");
                }
            }
        })
    }
}

#[async_trait]
impl TopicHandler for SensorFeed {
    async fn on_subscribe(&self, _topic: &str) -> Option<Envelope> {
        let snapshot = self.snapshot().await;
        match Envelope::from_payload(&self.events.init, &snapshot) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::error!(topic = %self.topic, error = %e, "Failed to build snapshot");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::PushSensorSource;
    use crate::websocket::{ConnectionHandle, ConnectionRegistry, DeliveryConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct Counter(AtomicUsize);

    #[async_trait]
    impl ReadingObserver for Counter {
        async fn observe(&self, readings: &[Reading]) {
            self.0.fetch_add(readings.len(), Ordering::SeqCst);
        }
    }

    async fn setup() -> (Arc<PushSensorSource>, Arc<Broadcaster>, Arc<ConnectionRegistry>) {
        let source = Arc::new(PushSensorSource::new());
        source
            .accept(vec![Reading::new("s1", "Garage", 72.3)])
            .await
            .unwrap();
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&registry),
            DeliveryConfig::default(),
        ));
        (source, broadcaster, registry)
    }

    #[tokio::test]
    async fn test_poll_broadcasts_update() {
        let (source, broadcaster, registry) = setup().await;
        let (tx, mut rx) = mpsc::channel(4);
        registry
            .register(ConnectionHandle::new("c", tx), "multiSensor")
            .await
            .unwrap();

        let feed = SensorFeed::new(
            "multiSensor",
            FeedEvents::new("multi_init", "multi_update"),
            source,
            broadcaster,
            Duration::from_secs(60),
        );
        assert_eq!(feed.poll_once().await.unwrap(), 1);

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.event(), "multi_update");
        assert_eq!(envelope.data()["all"][0]["name"], "Garage");
        assert_eq!(envelope.data()["all"][0]["temp"], 72.3);
    }

    #[tokio::test]
    async fn test_snapshot_for_new_subscriber() {
        let (source, broadcaster, _registry) = setup().await;
        let feed = SensorFeed::new(
            "all",
            FeedEvents::default(),
            source,
            broadcaster,
            Duration::from_secs(60),
        );

        // Nothing polled yet: an empty snapshot
        let before = feed.on_subscribe("all").await.unwrap();
        assert_eq!(before.event(), "init");
        assert_eq!(before.data()["all"].as_array().unwrap().len(), 0);

        feed.poll_once().await.unwrap();
        let after = feed.on_subscribe("all").await.unwrap();
        assert_eq!(after.data()["all"][0]["id"], "s1");
    }

    #[tokio::test]
    async fn test_observers_see_each_round() {
        let (source, broadcaster, _registry) = setup().await;
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let feed = SensorFeed::new(
            "all",
            FeedEvents::default(),
            source,
            broadcaster,
            Duration::from_secs(60),
        )
        .with_observer(Arc::clone(&counter) as Arc<dyn ReadingObserver>);

        feed.poll_once().await.unwrap();
        feed.poll_once().await.unwrap();

        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_started_feed_polls_immediately() {
        let (source, broadcaster, _registry) = setup().await;
        let feed = Arc::new(SensorFeed::new(
            "all",
            FeedEvents::default(),
            source,
            broadcaster,
            Duration::from_secs(60),
        ));

        let handle = Arc::clone(&feed).start();
        for _ in 0..50 {
            if !feed.snapshot().await.all.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(feed.snapshot().await.all.len(), 1);
    }
}
