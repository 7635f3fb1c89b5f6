//! Plugin system error types.

use thiserror::Error;

use crate::alerts::AlertError;
use crate::sensors::SensorError;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin {plugin}: {hook} failed: {source}")]
    Hook {
        plugin: String,
        hook: &'static str,
        #[source]
        source: Box<PluginError>,
    },

    #[error("plugin {plugin}: {hook} panicked: {message}")]
    Panicked {
        plugin: String,
        hook: &'static str,
        message: String,
    },

    #[error("plugin {plugin}: route conflict: {message}")]
    RouteConflict { plugin: String, message: String },

    #[error("invalid plugin configuration: {0}")]
    Config(String),

    #[error("plugin state error: {0}")]
    State(String),

    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("alert error: {0}")]
    Alert(#[from] AlertError),
}
