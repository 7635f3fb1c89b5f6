//! # Sensorcast
//!
//! Real-time sensor monitoring server: sensors report temperature readings,
//! dashboards subscribe to a topic over WebSocket and receive every update
//! live, and plugins extend the HTTP and WebSocket surface.
//!
//! ## Features
//!
//! - **Topic fan-out**: at-most-once delivery through bounded per-connection queues
//! - **Plugins**: extra routes, message types and background hooks, loaded in order
//! - **Sensor feeds**: HTTP-polled, simulated or pushed readings
//! - **Alerts**: edge-triggered thresholds delivered to a webhook
//!
//! ## Modules
//!
//! - [`websocket`]: connection registry, broadcaster and per-connection sessions
//! - [`plugins`]: plugin trait, registry and the bundled multiSensor plugin
//! - [`sensors`]: reading model, sources and the poll-and-broadcast feed
//! - [`alerts`]: threshold rules and notifiers
//! - [`server`]: startup wiring
//! - [`api`]: HTTP routes with Axum
//! - [`config`] / [`logging`]: TOML configuration and tracing setup
//! - [`client`]: dashboard-side watcher with reconnects
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sensorcast::{api, plugins, Config, ServerCore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let addr = config.server.addr();
//!     let debug = config.server.debug;
//!     let descriptors = plugins::from_config(&config);
//!
//!     let startup = ServerCore::new(config)?.on_startup(descriptors, debug);
//!     let shutdown = startup.state.shutdown.clone();
//!     api::serve(startup.router.clone(), &addr, shutdown).await?;
//!     startup.stop();
//!     Ok(())
//! }
//! ```

pub mod alerts;
pub mod api;
pub mod client;
pub mod config;
pub mod logging;
pub mod plugins;
pub mod sensors;
pub mod server;
pub mod websocket;

pub use api::{build_router, core_routes, finish_router, serve, ApiError, AppState, ShutdownSignal};

pub use config::{Config, ConfigError, LoggingConfig};

pub use plugins::{Plugin, PluginContext, PluginDescriptor, PluginError, PluginRegistry};

pub use sensors::{Reading, SensorError, SensorFeed, SensorSource};

pub use server::{ServerCore, Startup};

pub use websocket::{
    Broadcaster, ConnectionRegistry, DeliveryConfig, Envelope, RegistryError, websocket_handler,
};
