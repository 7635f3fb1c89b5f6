//! Sensorcast HTTP Layer
//!
//! HTTP surface of the server, built with Axum.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /` - WebSocket upgrade; plain requests get the dashboard page
//! - `GET /ws` - WebSocket upgrade
//!
//! ## Readings
//! - `POST /api/v1/readings` - Push a batch of sensor readings
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Connections, uptime, loaded plugins
//!
//! ## Debug (only with `server.debug`)
//! - `GET /EXIT` - Graceful shutdown
//!
//! Plugins add their own routes (see [`crate::plugins`]). Anything else is
//! served from `server.static_dir` when set, or answered with a 404 page.

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, ShutdownSignal};

use axum::{
    handler::HandlerWithoutStateExt,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::websocket::websocket_handler;

/// Routes the server always owns. `debug` adds `GET /EXIT`.
pub fn core_routes(debug: bool) -> Router<Arc<AppState>> {
    let api_routes = Router::new().route("/readings", post(routes::readings::ingest_readings));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    let router = Router::new()
        .route("/", get(routes::root::root))
        .route("/ws", get(websocket_handler))
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes);

    if debug {
        tracing::warn!("Debug mode: GET /EXIT is mounted");
        router.route("/EXIT", get(routes::debug::exit))
    } else {
        router
    }
}

/// Build the router: core routes, plugin routes, fallback and middleware.
///
/// # Panics
///
/// Panics if `plugin_routes` overlaps a core route. Startup loads plugins
/// with [`PluginRegistry::load_onto`](crate::plugins::PluginRegistry::load_onto)
/// and [`finish_router`] instead, which turns an overlap into a plugin load
/// failure.
pub fn build_router(state: Arc<AppState>, plugin_routes: Router<Arc<AppState>>) -> Router {
    let routes = core_routes(state.config.server.debug).merge(plugin_routes);
    finish_router(state, routes)
}

/// Add the fallback and middleware to a complete route table
pub fn finish_router(state: Arc<AppState>, routes: Router<Arc<AppState>>) -> Router {
    let mut router = routes;

    router = match &state.config.server.static_dir {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).not_found_service(routes::fallback::not_found.into_service()),
        ),
        None => router.fallback(routes::fallback::not_found),
    };

    let cors = if state.config.server.cors_permissive {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the server and run until Ctrl+C, SIGTERM or `shutdown` fires
pub async fn serve(router: Router, addr: &str, shutdown: ShutdownSignal) -> Result<(), ApiError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Sensorcast listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Sensorcast shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal(requested: ShutdownSignal) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = requested.triggered() => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
