//! Sensor Sources
//!
//! Where live readings come from, and the feed that turns them into
//! broadcasts:
//! - HTTP: poll a sensor interface (`GET {url}/temp`)
//! - Simulated: random values for development without hardware
//! - Push: readings posted to the ingest endpoint

mod feed;
mod http;
mod push;
mod simulated;

pub use feed::{FeedEvents, ReadingObserver, SensorFeed};
pub use http::HttpSensorSource;
pub use push::PushSensorSource;
pub use simulated::SimulatedSensorSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{SensorsConfig, SourceKind};

/// One temperature reading, in °F
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: String,
    pub name: String,
    #[serde(alias = "value")]
    pub temp: f64,
}

impl Reading {
    pub fn new(id: impl Into<String>, name: impl Into<String>, temp: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            temp,
        }
    }
}

/// Payload of every sensor envelope: `{"all": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub all: Vec<Reading>,
}

/// Common trait for all reading sources
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Current reading of every sensor
    async fn read_all(&self) -> Result<Vec<Reading>, SensorError>;
}

/// Sources built from configuration
pub struct Sources {
    /// Source feeds poll
    pub active: Arc<dyn SensorSource>,
    /// Set when the active source accepts pushed readings
    pub push: Option<Arc<PushSensorSource>>,
}

/// Build the configured source
pub fn source_from_config(config: &SensorsConfig) -> Result<Sources, SensorError> {
    let sources = match config.source {
        SourceKind::Http => Sources {
            active: Arc::new(HttpSensorSource::new(
                &config.url,
                Duration::from_millis(config.request_timeout_ms),
            )?),
            push: None,
        },
        SourceKind::Simulated => Sources {
            active: Arc::new(SimulatedSensorSource::new(config.devices.clone())),
            push: None,
        },
        SourceKind::Push => {
            let push = Arc::new(PushSensorSource::new());
            Sources {
                active: Arc::clone(&push) as Arc<dyn SensorSource>,
                push: Some(push),
            }
        }
    };

    tracing::info!(source = %sources.active.name(), "Sensor source ready");
    Ok(sources)
}

/// Errors that can occur while reading sensors
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Sensor interface request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Sensor interface returned status {0}")]
    Status(u16),

    #[error("Invalid reading: {0}")]
    InvalidReading(String),

    #[error("Failed to build envelope: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reject readings that cannot be broadcast meaningfully
pub fn validate_reading(reading: &Reading) -> Result<(), SensorError> {
    if reading.id.trim().is_empty() {
        return Err(SensorError::InvalidReading(
            "Sensor id cannot be empty".to_string(),
        ));
    }
    if !reading.temp.is_finite() {
        return Err(SensorError::InvalidReading(format!(
            "Temperature for {} must be a finite number",
            reading.id
        )));
    }
    Ok(())
}
