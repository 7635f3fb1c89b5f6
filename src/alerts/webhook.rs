//! Alert Transports
//!
//! Webhook delivery (Discord-compatible `{"content": ...}` body) and a
//! log-only fallback used when no webhook is configured.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{Alert, AlertError, AlertNotifier};

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Posts alerts to a webhook URL
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertNotifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, alert: &Alert) -> Result<(), AlertError> {
        let content = format!("🛑 {}", alert);
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { content: &content })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AlertError::Status(response.status().as_u16()))
        }
    }
}

/// Writes alerts to the log
pub struct LogNotifier;

#[async_trait]
impl AlertNotifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, alert: &Alert) -> Result<(), AlertError> {
        tracing::warn!(sensor_id = %alert.sensor_id, temp = alert.temp, "{}", alert);
        Ok(())
    }
}
