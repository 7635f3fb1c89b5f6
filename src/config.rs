//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alerts::AlertRule;
use crate::websocket::DeliveryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub sensors: SensorsConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP / WebSocket server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Mounts the diagnostic shutdown route
    #[serde(default)]
    pub debug: bool,

    /// Directory of dashboard assets served at `/`
    #[serde(default)]
    pub static_dir: Option<String>,

    /// Close connections that send no topic within this many seconds (0 = never)
    #[serde(default)]
    pub topic_timeout_secs: u64,

    #[serde(default = "default_cors_permissive")]
    pub cors_permissive: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_permissive() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
            static_dir: None,
            topic_timeout_secs: 0,
            cors_permissive: default_cors_permissive(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn topic_timeout(&self) -> Option<Duration> {
        (self.topic_timeout_secs > 0).then(|| Duration::from_secs(self.topic_timeout_secs))
    }
}

/// Fan-out configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    64
}

fn default_write_timeout() -> u64 {
    2000
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            write_timeout_ms: default_write_timeout(),
        }
    }
}

impl BroadcastConfig {
    pub fn delivery(&self) -> DeliveryConfig {
        DeliveryConfig {
            queue_capacity: self.queue_capacity.max(1),
            // A zero timeout would fail every write
            write_timeout: Duration::from_millis(self.write_timeout_ms.max(1)),
        }
    }
}

/// Where sensor readings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Poll a sensor interface over HTTP
    Http,
    /// Random values, for development without hardware
    Simulated,
    /// Readings pushed to `POST /api/v1/readings`
    Push,
}

/// Sensor source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SensorsConfig {
    #[serde(default = "default_source")]
    pub source: SourceKind,

    /// Base URL of the sensor interface (http source)
    #[serde(default = "default_sensor_url")]
    pub url: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Topic served by the built-in handler
    #[serde(default = "default_topic")]
    pub default_topic: String,

    /// Devices for the simulated source
    #[serde(default = "default_devices")]
    pub devices: Vec<SensorDevice>,
}

/// A physical (or simulated) sensor
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorDevice {
    pub id: String,
    pub name: String,
    /// Offset added to every reading
    #[serde(default)]
    pub calibration: f64,
}

fn default_source() -> SourceKind {
    SourceKind::Simulated
}

fn default_sensor_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_poll_interval() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    3000
}

fn default_topic() -> String {
    "all".to_string()
}

fn default_devices() -> Vec<SensorDevice> {
    vec![
        SensorDevice {
            id: "s1".to_string(),
            name: "Garage".to_string(),
            calibration: 0.0,
        },
        SensorDevice {
            id: "s2".to_string(),
            name: "Water".to_string(),
            calibration: 0.0,
        },
    ]
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            url: default_sensor_url(),
            poll_interval_ms: default_poll_interval(),
            request_timeout_ms: default_request_timeout(),
            default_topic: default_topic(),
            devices: default_devices(),
        }
    }
}

impl SensorsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Plugin configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginsConfig {
    /// Plugins to load, in load order
    #[serde(default)]
    pub enabled: Vec<String>,

    #[serde(default)]
    pub multi_sensor: MultiSensorConfig,
}

/// Settings for the multiSensor plugin
#[derive(Debug, Clone, Deserialize)]
pub struct MultiSensorConfig {
    #[serde(default = "default_multi_topic")]
    pub topic: String,

    /// Overrides `sensors.poll_interval_ms` for this plugin's feed
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    #[serde(default)]
    pub alerts: Vec<AlertRule>,

    /// Discord-compatible webhook; alerts are only logged without one
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_multi_topic() -> String {
    "multiSensor".to_string()
}

impl Default for MultiSensorConfig {
    fn default() -> Self {
        Self {
            topic: default_multi_topic(),
            poll_interval_ms: None,
            alerts: Vec::new(),
            webhook_url: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("sensorcast").join("config.toml")),
            Some(PathBuf::from("/etc/sensorcast/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SENSORCAST_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SENSORCAST_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(debug) = std::env::var("SENSORCAST_DEBUG") {
            self.server.debug = parse_flag(&debug);
        }

        if let Ok(url) = std::env::var("SENSORCAST_SENSOR_URL") {
            self.sensors.url = url;
            self.sensors.source = SourceKind::Http;
        }

        if let Ok(level) = std::env::var("SENSORCAST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SENSORCAST_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Sensorcast Configuration
#
# Environment variables override these settings:
# - SENSORCAST_HOST
# - SENSORCAST_PORT
# - SENSORCAST_DEBUG
# - SENSORCAST_SENSOR_URL (also switches the source to "http")
# - SENSORCAST_LOG_LEVEL
# - SENSORCAST_LOG_FORMAT

[server]
host = "0.0.0.0"
port = 8080

# Mounts GET /EXIT, which shuts the server down. Never enable in production.
debug = false

# Dashboard assets served at /
# static_dir = "./public"

# Close connections that send no topic within this many seconds (0 = never)
topic_timeout_secs = 0

cors_permissive = true

[broadcast]
# Envelopes buffered per connection before it is considered stalled
queue_capacity = 64

# Longest a single socket write may take (ms)
write_timeout_ms = 2000

[sensors]
# "http" (poll a sensor interface), "simulated" or "push"
source = "simulated"

# Sensor interface base URL, polled at {url}/temp
url = "http://127.0.0.1:8000"

poll_interval_ms = 5000
request_timeout_ms = 3000

# Topic served by the built-in handler
default_topic = "all"

[[sensors.devices]]
id = "s1"
name = "Garage"
calibration = 0.0

[[sensors.devices]]
id = "s2"
name = "Water"
calibration = 0.0

[plugins]
# Plugins to load, in order
enabled = []

[plugins.multi_sensor]
topic = "multiSensor"
# webhook_url = "https://discord.com/api/webhooks/<id>/<token>"

# [[plugins.multi_sensor.alerts]]
# sensor = "s1"
# above = 80.0
# below = 32.0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
