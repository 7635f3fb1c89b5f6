//! Plugin System
//!
//! Plugins extend the server without the core knowing them in advance.
//! A plugin implements [`Plugin`], overriding only the hooks it needs:
//!
//! - `install_routes`: extra HTTP routes
//! - `install_handlers`: topic snapshots and extra WebSocket message types
//! - `on_load`: background work such as feeds and alert monitors
//!
//! Each hook receives a [`PluginContext`] carrying the router, the
//! broadcaster (and through it the connection registry), the global
//! configuration and the debug flag. A plugin that returns `true` from
//! `disables_default` turns off the built-in topic handler.

mod error;
mod multi_sensor;
mod registry;

pub use error::PluginError;
pub use multi_sensor::MultiSensorPlugin;
pub use registry::{FailedPlugin, LoadedPlugin, PluginRegistry};

use axum::routing::MethodRouter;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::api::AppState;
use crate::config::Config;
use crate::sensors::SensorSource;
use crate::websocket::{Broadcaster, HandlerTable, MessageHandler, TopicHandler};

/// Capability hooks a plugin may implement
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Whether loading this plugin turns off the built-in topic handler
    fn disables_default(&self) -> bool {
        false
    }

    fn install_routes(&self, _ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    fn install_handlers(&self, _ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_load(&self, _ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }
}

/// One plugin as handed to the registry at startup
pub struct PluginDescriptor {
    plugin: Box<dyn Plugin>,
}

impl PluginDescriptor {
    pub fn new(plugin: impl Plugin + 'static) -> Self {
        Self {
            plugin: Box::new(plugin),
        }
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn disables_default(&self) -> bool {
        self.plugin.disables_default()
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }
}

/// Build descriptors for the plugins enabled in configuration, in order
pub fn from_config(config: &Config) -> Vec<PluginDescriptor> {
    let mut descriptors = Vec::new();
    for name in &config.plugins.enabled {
        match name.as_str() {
            MultiSensorPlugin::NAME => descriptors.push(PluginDescriptor::new(
                MultiSensorPlugin::new(config.plugins.multi_sensor.clone()),
            )),
            unknown => {
                tracing::warn!(plugin = %unknown, "Unknown plugin in configuration, skipping");
            }
        }
    }
    descriptors
}

/// Shared handles every plugin hook can use
#[derive(Clone)]
pub struct PluginHost {
    pub broadcaster: Arc<Broadcaster>,
    pub sensors: Arc<dyn SensorSource>,
    pub config: Arc<Config>,
    pub debug: bool,
}

/// What a plugin has installed so far
#[derive(Default)]
pub struct Installed {
    pub router: Router<Arc<AppState>>,
    pub handlers: HandlerTable,
    pub tasks: Vec<JoinHandle<()>>,
}

impl Installed {
    fn abort(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// The view of the server a plugin hook receives.
///
/// Routes and handlers are collected per plugin and only reach the server
/// once every hook of that plugin has succeeded.
pub struct PluginContext<'a> {
    host: &'a PluginHost,
    installed: Installed,
}

impl<'a> PluginContext<'a> {
    fn new(host: &'a PluginHost) -> Self {
        Self {
            host,
            installed: Installed::default(),
        }
    }

    /// Add an HTTP route
    pub fn route(&mut self, path: &str, method_router: MethodRouter<Arc<AppState>>) -> &mut Self {
        let router = std::mem::take(&mut self.installed.router);
        self.installed.router = router.route(path, method_router);
        self
    }

    /// Answer new subscribers of `topic`
    pub fn topic_handler(
        &mut self,
        topic: impl Into<String>,
        handler: Arc<dyn TopicHandler>,
    ) -> &mut Self {
        self.installed.handlers.add_topic_handler(topic, handler);
        self
    }

    /// Serve a client message type
    pub fn message_handler(
        &mut self,
        kind: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> &mut Self {
        self.installed.handlers.add_message_handler(kind, handler);
        self
    }

    /// Run a background task owned by this plugin
    pub fn spawn<F>(&mut self, task: F) -> &mut Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.installed.tasks.push(tokio::spawn(task));
        self
    }

    /// Track an already spawned task
    pub fn track(&mut self, handle: JoinHandle<()>) -> &mut Self {
        self.installed.tasks.push(handle);
        self
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.host.broadcaster
    }

    pub fn sensor_source(&self) -> &Arc<dyn SensorSource> {
        &self.host.sensors
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.host.config
    }

    pub fn debug(&self) -> bool {
        self.host.debug
    }

    fn into_installed(self) -> Installed {
        self.installed
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::sensors::{PushSensorSource, Reading};
    use crate::websocket::{ConnectionRegistry, DeliveryConfig};

    /// Host backed by a push source holding one Garage reading
    pub async fn host(config: Config) -> PluginHost {
        let source = Arc::new(PushSensorSource::new());
        source
            .accept(vec![Reading::new("s1", "Garage", 72.3)])
            .await
            .unwrap();
        let registry = Arc::new(ConnectionRegistry::new());
        PluginHost {
            broadcaster: Arc::new(Broadcaster::new(registry, DeliveryConfig::default())),
            sensors: source,
            config: Arc::new(config),
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_keeps_order_and_skips_unknown() {
        let mut config = Config::default();
        config.plugins.enabled = vec![
            "nope".to_string(),
            "multiSensor".to_string(),
        ];

        let descriptors = from_config(&config);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name(), "multiSensor");
        assert!(descriptors[0].disables_default());
    }

    #[test]
    fn test_from_config_empty() {
        assert!(from_config(&Config::default()).is_empty());
    }
}
