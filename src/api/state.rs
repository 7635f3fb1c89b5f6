//! Application State
//!
//! Shared state accessible by all HTTP and WebSocket handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use crate::config::Config;
use crate::sensors::PushSensorSource;
use crate::websocket::{Broadcaster, HandlerTable};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Effective configuration (file + env + CLI)
    pub config: Arc<Config>,
    /// Delivers envelopes to subscribers; owns the connection registry
    pub broadcaster: Arc<Broadcaster>,
    /// Topic and message handlers from plugins and the default feed
    pub handlers: Arc<HandlerTable>,
    /// Store for readings posted over HTTP, when that source is configured
    pub push_source: Option<Arc<PushSensorSource>>,
    /// Names of the plugins that loaded, in load order
    pub plugins: Vec<String>,
    /// Whether the built-in topic handler is installed
    pub default_loaded: bool,
    /// Requests a graceful shutdown
    pub shutdown: ShutdownSignal,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Arc<Config>, broadcaster: Arc<Broadcaster>, handlers: HandlerTable) -> Self {
        Self {
            config,
            broadcaster,
            handlers: Arc::new(handlers),
            push_source: None,
            plugins: Vec::new(),
            default_loaded: true,
            shutdown: ShutdownSignal::new(),
            start_time: Instant::now(),
        }
    }

    pub fn with_push_source(mut self, source: Option<Arc<PushSensorSource>>) -> Self {
        self.push_source = source;
        self
    }

    pub fn with_plugins(mut self, plugins: Vec<String>, default_loaded: bool) -> Self {
        self.plugins = plugins;
        self.default_loaded = default_loaded;
        self
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Live WebSocket connection count
    pub async fn connection_count(&self) -> usize {
        self.broadcaster.registry().connection_count().await
    }

    /// State sharing a plugin host's broadcaster and config
    #[cfg(test)]
    pub(crate) fn for_tests(host: crate::plugins::PluginHost) -> Arc<Self> {
        Arc::new(Self::new(host.config, host.broadcaster, HandlerTable::new()))
    }
}

/// One-shot, clonable shutdown request
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `trigger` has been called (immediately if it already was)
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|requested| *requested).await;
    }
}
