//! WebSocket Message Types
//!
//! Defines the envelope pushed to subscribers and the messages a client
//! may send once it has declared its topic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event tag for error replies sent to a single connection
pub const ERROR_EVENT: &str = "error";

/// Event tag for the reply to a client `ping`
pub const PONG_EVENT: &str = "pong";

/// A tagged payload delivered to subscribers.
///
/// Fields are private so an envelope cannot change after construction;
/// the broadcaster shares one instance (behind an `Arc`) across every
/// recipient of a publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    event: String,
    data: Value,
}

impl Envelope {
    /// Create an envelope from an already-built JSON payload
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Create an envelope by serializing a typed payload
    pub fn from_payload<T: Serialize>(
        event: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event, serde_json::to_value(payload)?))
    }

    /// Error reply for a single connection
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            ERROR_EVENT,
            serde_json::json!({ "message": message.into() }),
        )
    }

    /// Reply to a client ping
    pub fn pong() -> Self {
        Self::new(PONG_EVENT, Value::Null)
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Serialize to the text frame sent over the wire
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A message sent by a client after its subscription is established.
///
/// `{"type": "ping"}` is handled by the core; every other `type` is routed
/// to the message handler a plugin registered for it.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl ClientMessage {
    pub fn is_ping(&self) -> bool {
        self.kind == "ping"
    }
}
