//! Threshold Alerts
//!
//! Watches polled readings against configured limits and notifies when a
//! sensor leaves its allowed range. Alerts are edge-triggered: a rule fires
//! once when a sensor crosses out of range and re-arms once it is back.

mod webhook;

pub use webhook::{LogNotifier, WebhookNotifier};

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::sensors::{Reading, ReadingObserver};

/// A temperature limit for one sensor, or for every sensor when `sensor` is unset
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AlertRule {
    #[serde(default)]
    pub sensor: Option<String>,
    #[serde(default)]
    pub above: Option<f64>,
    #[serde(default)]
    pub below: Option<f64>,
}

impl AlertRule {
    pub fn applies_to(&self, reading: &Reading) -> bool {
        self.sensor.as_deref().map_or(true, |id| id == reading.id)
    }

    /// The limit a reading violates, if any
    pub fn breach(&self, temp: f64) -> Option<Breach> {
        if let Some(limit) = self.above {
            if temp > limit {
                return Some(Breach::Above(limit));
            }
        }
        if let Some(limit) = self.below {
            if temp < limit {
                return Some(Breach::Below(limit));
            }
        }
        None
    }
}

/// Which side of a limit a reading fell on
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Breach {
    Above(f64),
    Below(f64),
}

/// A fired alert
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub sensor_id: String,
    pub sensor_name: String,
    pub temp: f64,
    pub breach: Breach,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (side, limit) = match self.breach {
            Breach::Above(limit) => ("above", limit),
            Breach::Below(limit) => ("below", limit),
        };
        write!(
            f,
            "{} ({}) is {:.1}°F, {} the {:.1}°F limit",
            self.sensor_name, self.sensor_id, self.temp, side, limit
        )
    }
}

/// Delivers alerts somewhere a human will see them
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, alert: &Alert) -> Result<(), AlertError>;
}

/// Evaluates rules and forwards new breaches to a notifier
pub struct AlertMonitor {
    rules: Vec<AlertRule>,
    notifier: Arc<dyn AlertNotifier>,
    /// (rule index, sensor id) pairs currently out of range
    tripped: Mutex<HashSet<(usize, String)>>,
}

impl AlertMonitor {
    pub fn new(rules: Vec<AlertRule>, notifier: Arc<dyn AlertNotifier>) -> Self {
        Self {
            rules,
            notifier,
            tripped: Mutex::new(HashSet::new()),
        }
    }

    /// Alerts newly raised by this round of readings
    pub async fn evaluate(&self, readings: &[Reading]) -> Vec<Alert> {
        let mut tripped = self.tripped.lock().await;
        let mut raised = Vec::new();

        for (index, rule) in self.rules.iter().enumerate() {
            for reading in readings.iter().filter(|r| rule.applies_to(r)) {
                let key = (index, reading.id.clone());
                match rule.breach(reading.temp) {
                    Some(breach) => {
                        if tripped.insert(key) {
                            raised.push(Alert {
                                sensor_id: reading.id.clone(),
                                sensor_name: reading.name.clone(),
                                temp: reading.temp,
                                breach,
                            });
                        }
                    }
                    None => {
                        tripped.remove(&key);
                    }
                }
            }
        }

        raised
    }

    /// Evaluate a round and notify; returns how many notifications went out
    pub async fn check(&self, readings: &[Reading]) -> usize {
        let mut sent = 0;
        for alert in self.evaluate(readings).await {
            match self.notifier.notify(&alert).await {
                Ok(()) => {
                    tracing::info!(
                        notifier = %self.notifier.name(),
                        sensor_id = %alert.sensor_id,
                        "Alert sent"
                    );
                    sent += 1;
                }
                Err(e) => {
                    tracing::error!(
                        notifier = %self.notifier.name(),
                        sensor_id = %alert.sensor_id,
                        error = %e,
                        "Error sending alert"
                    );
                }
            }
        }
        sent
    }
}

#[async_trait]
impl ReadingObserver for AlertMonitor {
    async fn observe(&self, readings: &[Reading]) {
        self.check(readings).await;
    }
}

/// Errors that can occur while delivering an alert
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Alert request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Alert endpoint returned status {0}")]
    Status(u16),
}
