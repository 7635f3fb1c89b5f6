//! Root Route
//!
//! `GET /` upgrades WebSocket requests; plain requests get the dashboard
//! (`index.html` from the static directory) or the not-found page.

use axum::{
    extract::{Request, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::Path;
use std::sync::Arc;
use tower::util::ServiceExt;
use tower_http::services::ServeFile;

use super::fallback::not_found;
use crate::api::state::AppState;
use crate::websocket;

/// GET /
pub async fn root(
    State(state): State<Arc<AppState>>,
    ws: Option<WebSocketUpgrade>,
    request: Request,
) -> Response {
    if let Some(ws) = ws {
        return websocket::upgrade(ws, state);
    }

    let Some(dir) = state.config.server.static_dir.as_deref() else {
        return not_found().await.into_response();
    };

    let index = Path::new(dir).join("index.html");
    match ServeFile::new(index).oneshot(request).await {
        Ok(response) if response.status() != StatusCode::NOT_FOUND => response.into_response(),
        Ok(_) => not_found().await.into_response(),
        Err(never) => match never {},
    }
}
