//! multiSensor plugin
//!
//! Takes over the dashboard feed: publishes `multi_init` / `multi_update`
//! on its own topic, exposes the latest round over HTTP, answers
//! `multi_snapshot` requests and raises threshold alerts.

use async_trait::async_trait;
use axum::{routing::get, Json};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::{Plugin, PluginContext, PluginError};
use crate::alerts::{AlertMonitor, AlertNotifier, LogNotifier, WebhookNotifier};
use crate::config::MultiSensorConfig;
use crate::sensors::{FeedEvents, ReadingObserver, SensorFeed};
use crate::websocket::{Envelope, MessageError, MessageHandler, TopicHandler};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MultiSensorPlugin {
    config: MultiSensorConfig,
    feed: OnceLock<Arc<SensorFeed>>,
}

impl MultiSensorPlugin {
    pub const NAME: &'static str = "multiSensor";
    pub const SNAPSHOT_ROUTE: &'static str = "/api/v1/multi-sensor";
    pub const SNAPSHOT_MESSAGE: &'static str = "multi_snapshot";

    pub fn new(config: MultiSensorConfig) -> Self {
        Self {
            config,
            feed: OnceLock::new(),
        }
    }

    fn feed(&self) -> Result<&Arc<SensorFeed>, PluginError> {
        self.feed
            .get()
            .ok_or_else(|| PluginError::State("feed not installed".to_string()))
    }

    fn notifier(&self) -> Result<Arc<dyn AlertNotifier>, PluginError> {
        match &self.config.webhook_url {
            Some(url) => Ok(Arc::new(WebhookNotifier::new(url.clone(), WEBHOOK_TIMEOUT)?)),
            None => Ok(Arc::new(LogNotifier)),
        }
    }
}

impl Plugin for MultiSensorPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn disables_default(&self) -> bool {
        true
    }

    fn install_routes(&self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        if self.config.topic.trim().is_empty() {
            return Err(PluginError::Config("multi_sensor.topic is empty".to_string()));
        }

        let interval = self
            .config
            .poll_interval_ms
            .map(|ms| Duration::from_millis(ms.max(1)))
            .unwrap_or_else(|| ctx.config().sensors.poll_interval());

        let mut feed = SensorFeed::new(
            self.config.topic.clone(),
            FeedEvents::new("multi_init", "multi_update"),
            Arc::clone(ctx.sensor_source()),
            Arc::clone(ctx.broadcaster()),
            interval,
        );
        if !self.config.alerts.is_empty() {
            let monitor = AlertMonitor::new(self.config.alerts.clone(), self.notifier()?);
            feed = feed.with_observer(Arc::new(monitor) as Arc<dyn ReadingObserver>);
        }

        let feed = Arc::new(feed);
        self.feed
            .set(Arc::clone(&feed))
            .map_err(|_| PluginError::State("feed installed twice".to_string()))?;

        ctx.route(
            Self::SNAPSHOT_ROUTE,
            get(move || {
                let feed = Arc::clone(&feed);
                async move { Json(feed.snapshot().await) }
            }),
        );
        Ok(())
    }

    fn install_handlers(&self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        let feed = Arc::clone(self.feed()?);
        let snapshot = Arc::clone(&feed) as Arc<dyn TopicHandler>;
        ctx.topic_handler(feed.topic().to_string(), snapshot);
        ctx.message_handler(Self::SNAPSHOT_MESSAGE, Arc::new(SnapshotRequest { feed }));
        Ok(())
    }

    fn on_load(&self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        let feed = Arc::clone(self.feed()?);
        tracing::info!(
            topic = %feed.topic(),
            alerts = self.config.alerts.len(),
            webhook = self.config.webhook_url.is_some(),
            "multiSensor feed starting"
        );
        ctx.track(feed.start());
        Ok(())
    }
}

/// Replies with the feed's latest round
struct SnapshotRequest {
    feed: Arc<SensorFeed>,
}

#[async_trait]
impl MessageHandler for SnapshotRequest {
    async fn handle(
        &self,
        _connection_id: &str,
        _topic: &str,
        _data: Value,
    ) -> Result<Option<Envelope>, MessageError> {
        let snapshot = self.feed.snapshot().await;
        Envelope::from_payload(MultiSensorPlugin::SNAPSHOT_MESSAGE, &snapshot)
            .map(Some)
            .map_err(|e| MessageError::Handler(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertRule;
    use crate::config::Config;
    use crate::plugins::{testing, PluginDescriptor, PluginRegistry};
    use crate::websocket::ConnectionHandle;
    use axum::{body::Body, http::Request};
    use tokio::sync::mpsc;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn test_loads_and_disables_default() {
        let host = testing::host(Config::default()).await;
        let mut registry = PluginRegistry::new();
        let installed = registry.load(
            vec![PluginDescriptor::new(MultiSensorPlugin::new(
                MultiSensorConfig::default(),
            ))],
            &host,
        );

        assert!(!registry.should_load_default());
        assert!(installed.handlers.topic_handler("multiSensor").is_some());
        assert!(installed.handlers.message_handler("multi_snapshot").is_some());
        assert_eq!(installed.tasks.len(), 1);
        for task in installed.tasks {
            task.abort();
        }
    }

    #[tokio::test]
    async fn test_feed_publishes_multi_update() {
        let host = testing::host(Config::default()).await;
        let (tx, mut rx) = mpsc::channel(8);
        host.broadcaster
            .registry()
            .register(ConnectionHandle::new("c1", tx), "multiSensor")
            .await
            .unwrap();

        let plugin = MultiSensorPlugin::new(MultiSensorConfig::default());
        let installed = PluginRegistry::new().load(
            vec![PluginDescriptor::new(plugin)],
            &host,
        );

        let envelope = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.event(), "multi_update");
        assert_eq!(envelope.data()["all"][0]["name"], "Garage");

        for task in installed.tasks {
            task.abort();
        }
    }

    #[tokio::test]
    async fn test_snapshot_route_and_message() {
        let host = testing::host(Config::default()).await;
        let plugin = MultiSensorPlugin::new(MultiSensorConfig::default());
        let mut ctx = PluginContext::new(&host);
        plugin.install_routes(&mut ctx).unwrap();
        plugin.install_handlers(&mut ctx).unwrap();

        let feed = Arc::clone(plugin.feed().unwrap());
        feed.poll_once().await.unwrap();

        let installed = ctx.into_installed();
        let state = crate::api::AppState::for_tests(host);
        let app = installed.router.with_state(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri(MultiSensorPlugin::SNAPSHOT_ROUTE)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["all"][0]["temp"], 72.3);

        let reply = installed
            .handlers
            .message_handler("multi_snapshot")
            .unwrap()
            .handle("c1", "multiSensor", Value::Null)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.event(), "multi_snapshot");
        assert_eq!(reply.data()["all"][0]["id"], "s1");
    }

    #[tokio::test]
    async fn test_empty_topic_is_rejected() {
        let host = testing::host(Config::default()).await;
        let config = MultiSensorConfig {
            topic: "  ".to_string(),
            ..MultiSensorConfig::default()
        };

        let mut registry = PluginRegistry::new();
        registry.load(vec![PluginDescriptor::new(MultiSensorPlugin::new(config))], &host);

        assert!(registry.loaded().is_empty());
        assert!(registry.should_load_default());
    }

    #[tokio::test]
    async fn test_alert_rules_build_monitor() {
        let host = testing::host(Config::default()).await;
        let config = MultiSensorConfig {
            alerts: vec![AlertRule {
                sensor: Some("s1".to_string()),
                above: Some(80.0),
                below: None,
            }],
            ..MultiSensorConfig::default()
        };

        let mut registry = PluginRegistry::new();
        let installed = registry.load(
            vec![PluginDescriptor::new(MultiSensorPlugin::new(config))],
            &host,
        );

        assert_eq!(registry.loaded().len(), 1);
        for task in installed.tasks {
            task.abort();
        }
    }
}
