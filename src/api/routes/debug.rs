//! Debug Routes
//!
//! - GET /EXIT - stop the server; mounted only in debug mode

use axum::extract::State;
use std::sync::Arc;

use crate::api::state::AppState;

/// GET /EXIT
///
/// Replies `ok`, then the server shuts down gracefully.
pub async fn exit(State(state): State<Arc<AppState>>) -> &'static str {
    tracing::warn!("Exit requested over HTTP");
    state.shutdown.trigger();
    "ok"
}
