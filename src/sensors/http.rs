//! Sensor Interface Client
//!
//! Polls a sensor interface that reports every device at `GET {url}/temp`
//! as a JSON array of readings.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{validate_reading, Reading, SensorError, SensorSource};

/// Reads sensors over HTTP
pub struct HttpSensorSource {
    client: Client,
    base_url: String,
}

impl HttpSensorSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SensorError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/temp", self.base_url)
    }
}

#[async_trait]
impl SensorSource for HttpSensorSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn read_all(&self) -> Result<Vec<Reading>, SensorError> {
        let response = self.client.get(self.endpoint()).send().await?;

        if !response.status().is_success() {
            return Err(SensorError::Status(response.status().as_u16()));
        }

        let readings: Vec<Reading> = response.json().await?;
        for reading in &readings {
            validate_reading(reading)?;
        }

        tracing::trace!(count = readings.len(), "Polled sensor interface");
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};

    #[test]
    fn test_endpoint_normalizes_trailing_slash() {
        let source = HttpSensorSource::new("http://pi:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(source.endpoint(), "http://pi:8000/temp");
    }

    #[tokio::test]
    async fn test_reads_from_sensor_interface() {
        let app = Router::new().route(
            "/temp",
            get(|| async {
                Json(serde_json::json!([
                    {"id": "s1", "name": "Garage", "value": 72.3},
                    {"id": "s2", "name": "Water", "temp": 55.0}
                ]))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let source =
            HttpSensorSource::new(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
        let readings = source.read_all().await.unwrap();

        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0], Reading::new("s1", "Garage", 72.3));
        assert_eq!(readings[1].temp, 55.0);
    }

    #[tokio::test]
    async fn test_unreachable_interface_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source =
            HttpSensorSource::new(&format!("http://{}", addr), Duration::from_millis(500))
                .unwrap();
        assert!(matches!(
            source.read_all().await,
            Err(SensorError::Request(_))
        ));
    }
}
