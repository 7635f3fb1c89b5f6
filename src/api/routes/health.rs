//! Health Routes
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health - Full status: connections, uptime, plugins

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::api::state::AppState;

/// Full health status
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub topics: Vec<String>,
    pub uptime_seconds: u64,
    /// Loaded plugins, in load order
    pub plugins: Vec<String>,
    /// Whether the built-in topic handler is active
    pub default_handler: bool,
    pub version: String,
}

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let registry = state.broadcaster.registry();

    Json(HealthResponse {
        status: "healthy".to_string(),
        connections: registry.connection_count().await,
        topics: registry.topics().await,
        uptime_seconds: state.uptime_seconds(),
        plugins: state.plugins.clone(),
        default_handler: state.default_loaded,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let status = liveness().await;
        assert_eq!(status, StatusCode::OK);
    }
}
