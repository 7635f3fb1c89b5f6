//! Reading Ingest
//!
//! - POST /api/v1/readings - sensors push a batch of readings
//!
//! Readings are stored in the push source (when configured) and published
//! straight away to the requested topic, or the default topic.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::sensors::{validate_reading, Reading, SensorSnapshot};
use crate::websocket::Envelope;

/// Largest batch accepted in one request
pub const MAX_BATCH: usize = 1_000;

/// Body of POST /api/v1/readings
#[derive(Debug, Deserialize)]
pub struct ReadingsRequest {
    /// Topic to publish to; the default topic when absent
    #[serde(default)]
    pub topic: Option<String>,
    /// Event tag of the published envelope
    #[serde(default = "default_event")]
    pub event: String,
    pub readings: Vec<Reading>,
}

fn default_event() -> String {
    "update".to_string()
}

#[derive(Debug, Serialize)]
pub struct ReadingsResponse {
    pub status: String,
    pub accepted: usize,
    pub topic: String,
    /// Subscribers the update reached
    pub delivered: usize,
}

/// POST /api/v1/readings
pub async fn ingest_readings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReadingsRequest>,
) -> ApiResult<(StatusCode, Json<ReadingsResponse>)> {
    if req.readings.is_empty() {
        return Err(ApiError::Validation("Empty batch".to_string()));
    }
    if req.readings.len() > MAX_BATCH {
        return Err(ApiError::Validation(format!(
            "Batch size exceeds maximum of {} readings",
            MAX_BATCH
        )));
    }

    let topic = match req.topic {
        Some(topic) if topic.trim().is_empty() => {
            return Err(ApiError::Validation("Topic cannot be empty".to_string()))
        }
        Some(topic) => topic.trim().to_string(),
        None => state.config.sensors.default_topic.clone(),
    };

    for reading in &req.readings {
        validate_reading(reading)?;
    }

    let accepted = req.readings.len();
    if let Some(push) = &state.push_source {
        push.accept(req.readings.clone()).await?;
    }

    let snapshot = SensorSnapshot { all: req.readings };
    let envelope = Envelope::from_payload(&req.event, &snapshot)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let delivered = state.broadcaster.publish(&topic, envelope).await;

    tracing::debug!(topic = %topic, accepted, delivered, "Readings ingested");

    Ok((
        StatusCode::ACCEPTED,
        Json(ReadingsResponse {
            status: "ok".to_string(),
            accepted,
            topic,
            delivered,
        }),
    ))
}
