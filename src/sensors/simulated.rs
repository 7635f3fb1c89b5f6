//! Simulated Sensors
//!
//! Random readings in `[0, 10)` plus each device's calibration offset,
//! for running the server without hardware attached.

use async_trait::async_trait;
use rand::Rng;

use super::{Reading, SensorError, SensorSource};
use crate::config::SensorDevice;

pub struct SimulatedSensorSource {
    devices: Vec<SensorDevice>,
}

impl SimulatedSensorSource {
    pub fn new(devices: Vec<SensorDevice>) -> Self {
        Self { devices }
    }

    pub fn devices(&self) -> &[SensorDevice] {
        &self.devices
    }
}

#[async_trait]
impl SensorSource for SimulatedSensorSource {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn read_all(&self) -> Result<Vec<Reading>, SensorError> {
        let mut rng = rand::thread_rng();
        Ok(self
            .devices
            .iter()
            .map(|device| {
                let temp = rng.gen_range(0.0..10.0) + device.calibration;
                Reading::new(&device.id, &device.name, temp)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, calibration: f64) -> SensorDevice {
        SensorDevice {
            id: id.to_string(),
            name: "Water".to_string(),
            calibration,
        }
    }

    #[tokio::test]
    async fn test_readings_in_range() {
        let source = SimulatedSensorSource::new(vec![device("a", 0.0)]);
        for _ in 0..50 {
            let readings = source.read_all().await.unwrap();
            assert!(readings[0].temp >= 0.0 && readings[0].temp < 10.0);
        }
    }

    #[tokio::test]
    async fn test_calibration_offset_applied() {
        let source = SimulatedSensorSource::new(vec![device("a", 10.0), device("b", -5.0)]);
        let readings = source.read_all().await.unwrap();

        assert_eq!(readings.len(), 2);
        assert!(readings[0].temp >= 10.0 && readings[0].temp < 20.0);
        assert!(readings[1].temp >= -5.0 && readings[1].temp < 5.0);
        assert_eq!(readings[1].id, "b");
    }
}
