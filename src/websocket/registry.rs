//! Connection Registry
//!
//! Tracks every live subscriber connection and the single topic it
//! declared. The topic → connections map sits behind one `RwLock`, so a
//! connection is either fully registered or not visible at all.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

use super::messages::Envelope;

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// Why a single delivery attempt did not reach a connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    #[error("outbound queue is full")]
    QueueFull,

    #[error("connection is closed")]
    Closed,
}

/// Handle for sending envelopes to one connection.
///
/// Cloning is cheap; every clone feeds the same bounded outbound queue,
/// which the connection's writer task drains into the socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<Arc<Envelope>>,
}

impl ConnectionHandle {
    pub fn new(id: impl Into<ConnectionId>, sender: mpsc::Sender<Arc<Envelope>>) -> Self {
        Self {
            id: id.into(),
            sender,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// False once the writer side has gone away
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue an envelope without waiting
    pub fn try_deliver(&self, envelope: Arc<Envelope>) -> Result<(), DeliveryFailure> {
        self.sender.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

#[derive(Default)]
struct RegistryState {
    /// Topic → (ConnectionId → handle)
    topics: HashMap<String, HashMap<ConnectionId, ConnectionHandle>>,
    /// ConnectionId → topic, for removal without knowing the topic
    index: HashMap<ConnectionId, String>,
}

/// Registry of live subscriber connections
#[derive(Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under a topic.
    ///
    /// Topics are compared exactly; any non-empty string is accepted.
    pub async fn register(
        &self,
        connection: ConnectionHandle,
        topic: &str,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        if state.index.contains_key(connection.id()) {
            return Err(RegistryError::DuplicateConnection(connection.id.clone()));
        }

        let id = connection.id.clone();
        state.index.insert(id.clone(), topic.to_string());
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(id.clone(), connection);

        tracing::info!(connection_id = %id, topic = %topic, "Connection subscribed");
        Ok(())
    }

    /// Remove a connection from whichever topic holds it.
    ///
    /// Returns whether anything was removed; removing an absent id is a no-op.
    pub async fn unregister(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(topic) = state.index.remove(id) else {
            return false;
        };

        if let Some(bucket) = state.topics.get_mut(&topic) {
            bucket.remove(id);
            if bucket.is_empty() {
                state.topics.remove(&topic);
            }
        }

        tracing::info!(connection_id = %id, topic = %topic, "Connection unsubscribed");
        true
    }

    /// Snapshot of the connections subscribed to a topic
    pub async fn subscribers_of(&self, topic: &str) -> Vec<ConnectionHandle> {
        self.state
            .read()
            .await
            .topics
            .get(topic)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Topic a connection is registered under, if any
    pub async fn topic_of(&self, id: &str) -> Option<String> {
        self.state.read().await.index.get(id).cloned()
    }

    /// Number of registered connections across all topics
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.index.len()
    }

    /// Number of connections subscribed to a topic
    pub async fn subscription_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .await
            .topics
            .get(topic)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Topics that currently have at least one subscriber
    pub async fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.state.read().await.topics.keys().cloned().collect();
        topics.sort();
        topics
    }
}

/// Errors that can occur in the connection registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Connection already registered: {0}")]
    DuplicateConnection(ConnectionId),
}
