//! Pushed Readings
//!
//! Holds the latest reading per sensor as posted to the ingest endpoint.
//! Feeds poll it like any other source.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{validate_reading, Reading, SensorError, SensorSource};

#[derive(Default)]
pub struct PushSensorSource {
    /// Latest reading per sensor, in first-seen order
    latest: RwLock<Vec<Reading>>,
}

impl PushSensorSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a batch of readings, replacing earlier readings of the same sensor.
    ///
    /// The batch is validated as a whole; nothing is stored if any reading is invalid.
    pub async fn accept(&self, readings: Vec<Reading>) -> Result<usize, SensorError> {
        for reading in &readings {
            validate_reading(reading)?;
        }

        let count = readings.len();
        let mut latest = self.latest.write().await;
        for reading in readings {
            match latest.iter_mut().find(|r| r.id == reading.id) {
                Some(existing) => *existing = reading,
                None => latest.push(reading),
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl SensorSource for PushSensorSource {
    fn name(&self) -> &str {
        "push"
    }

    async fn read_all(&self) -> Result<Vec<Reading>, SensorError> {
        Ok(self.latest.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accept_replaces_by_id() {
        let source = PushSensorSource::new();
        source
            .accept(vec![
                Reading::new("s1", "Garage", 70.0),
                Reading::new("s2", "Water", 50.0),
            ])
            .await
            .unwrap();
        source
            .accept(vec![Reading::new("s1", "Garage", 71.5)])
            .await
            .unwrap();

        let readings = source.read_all().await.unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].temp, 71.5);
        assert_eq!(readings[1].id, "s2");
    }

    #[tokio::test]
    async fn test_invalid_batch_is_rejected_whole() {
        let source = PushSensorSource::new();
        let result = source
            .accept(vec![
                Reading::new("s1", "Garage", 70.0),
                Reading::new("s2", "Water", f64::INFINITY),
            ])
            .await;

        assert!(matches!(result, Err(SensorError::InvalidReading(_))));
        assert!(source.read_all().await.unwrap().is_empty());
    }
}
