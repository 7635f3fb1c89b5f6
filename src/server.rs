//! Server Core
//!
//! Wires configuration, the sensor source, the plugin registry and the
//! HTTP layer together at startup. Connection lifecycle (topic binding,
//! message routing, disconnect) lives in [`crate::websocket::Session`].

use std::sync::Arc;
use tokio::task::JoinHandle;

use axum::Router;

use crate::api::{core_routes, finish_router, AppState};
use crate::config::Config;
use crate::plugins::{PluginDescriptor, PluginHost, PluginRegistry};
use crate::sensors::{source_from_config, FeedEvents, SensorError, SensorFeed, Sources};
use crate::websocket::{Broadcaster, ConnectionRegistry, TopicHandler};

/// Everything needed to start serving
pub struct ServerCore {
    config: Config,
    broadcaster: Arc<Broadcaster>,
    sources: Sources,
}

/// Result of [`ServerCore::on_startup`]
pub struct Startup {
    pub router: Router,
    pub state: Arc<AppState>,
    pub plugins: PluginRegistry,
    /// Feeds and other background work; aborted by [`Startup::stop`]
    pub tasks: Vec<JoinHandle<()>>,
}

impl Startup {
    pub fn stop(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

impl ServerCore {
    /// Build with the sensor source named in configuration
    pub fn new(config: Config) -> Result<Self, SensorError> {
        let sources = source_from_config(&config.sensors)?;
        Ok(Self::with_source(config, sources))
    }

    /// Build with an explicit sensor source
    pub fn with_source(config: Config, sources: Sources) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry, config.broadcast.delivery()));
        Self {
            config,
            broadcaster,
            sources,
        }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Load plugins, install the default topic handler unless a plugin
    /// disabled it, and build the router.
    ///
    /// `debug` mounts `GET /EXIT`. A plugin whose routes overlap a core
    /// route is skipped like any other failed plugin.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since feeds and plugin
    /// tasks are spawned here.
    pub fn on_startup(mut self, descriptors: Vec<PluginDescriptor>, debug: bool) -> Startup {
        self.config.server.debug = debug;
        let config = Arc::new(self.config);

        let host = PluginHost {
            broadcaster: Arc::clone(&self.broadcaster),
            sensors: Arc::clone(&self.sources.active),
            config: Arc::clone(&config),
            debug,
        };

        let mut plugins = PluginRegistry::new();
        let installed = plugins.load_onto(core_routes(debug), descriptors, &host);
        let mut handlers = installed.handlers;
        let mut tasks = installed.tasks;

        let default_loaded = plugins.should_load_default();
        if default_loaded {
            let feed = Arc::new(SensorFeed::new(
                config.sensors.default_topic.clone(),
                FeedEvents::default(),
                Arc::clone(&self.sources.active),
                Arc::clone(&self.broadcaster),
                config.sensors.poll_interval(),
            ));
            let snapshot = Arc::clone(&feed) as Arc<dyn TopicHandler>;
            handlers.add_topic_handler(config.sensors.default_topic.clone(), snapshot);
            tasks.push(feed.start());
            tracing::info!(topic = %config.sensors.default_topic, "Default topic handler installed");
        } else {
            tracing::info!("Default topic handler disabled by plugin");
        }

        let loaded: Vec<String> = plugins.loaded().iter().map(|p| p.name.clone()).collect();
        let state = Arc::new(
            AppState::new(Arc::clone(&config), Arc::clone(&self.broadcaster), handlers)
                .with_push_source(self.sources.push.clone())
                .with_plugins(loaded, default_loaded),
        );

        let router = finish_router(Arc::clone(&state), installed.router);

        Startup {
            router,
            state,
            plugins,
            tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceKind;
    use crate::config::MultiSensorConfig;
    use crate::plugins::{MultiSensorPlugin, Plugin, PluginContext, PluginError};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use tower::util::ServiceExt;

    fn push_config() -> Config {
        let mut config = Config::default();
        config.sensors.source = SourceKind::Push;
        config
    }

    #[tokio::test]
    async fn test_default_handler_without_plugins() {
        let core = ServerCore::new(push_config()).unwrap();
        let startup = core.on_startup(Vec::new(), false);

        assert!(startup.state.default_loaded);
        assert!(startup.state.handlers.topic_handler("all").is_some());
        assert!(startup.state.push_source.is_some());
        startup.stop();
    }

    #[tokio::test]
    async fn test_multi_sensor_disables_default() {
        let core = ServerCore::new(push_config()).unwrap();
        let startup = core.on_startup(
            vec![PluginDescriptor::new(MultiSensorPlugin::new(
                MultiSensorConfig::default(),
            ))],
            false,
        );

        assert!(!startup.state.default_loaded);
        assert!(startup.state.handlers.topic_handler("all").is_none());
        assert!(startup.state.handlers.topic_handler("multiSensor").is_some());
        assert_eq!(startup.state.plugins, vec!["multiSensor".to_string()]);

        let response = startup
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/multi-sensor")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        startup.stop();
    }

    struct Squatter;

    impl Plugin for Squatter {
        fn name(&self) -> &str {
            "squatter"
        }

        fn disables_default(&self) -> bool {
            true
        }

        fn install_routes(&self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
            ctx.route("/EXIT", get(|| async { "mine" }));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_plugin_clashing_with_core_route_is_skipped() {
        let startup = ServerCore::new(push_config())
            .unwrap()
            .on_startup(vec![PluginDescriptor::new(Squatter)], true);

        assert_eq!(startup.plugins.failed()[0].name, "squatter");
        assert!(startup.state.plugins.is_empty());
        assert!(startup.state.default_loaded);

        let response = startup
            .router
            .clone()
            .oneshot(Request::builder().uri("/EXIT").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(startup.state.shutdown.is_triggered());
        startup.stop();
    }

    #[test]
    #[should_panic(expected = "Tokio 1.x runtime")]
    fn test_on_startup_needs_a_runtime() {
        ServerCore::new(push_config()).unwrap().on_startup(Vec::new(), false);
    }

    #[tokio::test]
    async fn test_debug_flag_mounts_exit() {
        let startup = ServerCore::new(push_config()).unwrap().on_startup(Vec::new(), true);

        let response = startup
            .router
            .clone()
            .oneshot(Request::builder().uri("/EXIT").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(startup.state.shutdown.is_triggered());
        startup.stop();
    }

    #[tokio::test]
    async fn test_no_debug_flag_no_exit() {
        let startup = ServerCore::new(push_config()).unwrap().on_startup(Vec::new(), false);

        let response = startup
            .router
            .clone()
            .oneshot(Request::builder().uri("/EXIT").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!startup.state.shutdown.is_triggered());
        startup.stop();
    }
}
