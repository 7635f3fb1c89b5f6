//! Dashboard Client
//!
//! The subscriber side of the protocol: a reconnect state machine and a
//! watcher that connects, declares a topic and yields envelopes.

mod reconnect;
mod watcher;

pub use reconnect::{LinkState, NextStep, ReconnectMachine, ReconnectPolicy, NORMAL_CLOSURE};
pub use watcher::{to_ws_url, TopicWatcher};

use thiserror::Error;

/// Errors that can occur while watching a topic
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}
