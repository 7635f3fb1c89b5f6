//! Extension Handlers
//!
//! Topic handlers answer a new subscriber with an initial envelope;
//! message handlers serve the client message types plugins add.
//! The table is assembled once at startup and read-only afterwards.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::messages::Envelope;

/// Called when a connection subscribes to the topic the handler owns
#[async_trait]
pub trait TopicHandler: Send + Sync {
    /// Envelope sent to the new subscriber before any broadcast, if any
    async fn on_subscribe(&self, topic: &str) -> Option<Envelope>;
}

/// Serves one client message type
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a message from a subscribed connection; the returned envelope
    /// is sent back to that connection only.
    async fn handle(
        &self,
        connection_id: &str,
        topic: &str,
        data: Value,
    ) -> Result<Option<Envelope>, MessageError>;
}

/// Errors surfaced to a client as an `error` envelope
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Handler failed: {0}")]
    Handler(String),
}

/// Topic and message handlers installed by plugins and the default feed
#[derive(Default, Clone)]
pub struct HandlerTable {
    topics: HashMap<String, Arc<dyn TopicHandler>>,
    messages: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_topic_handler(&mut self, topic: impl Into<String>, handler: Arc<dyn TopicHandler>) {
        let topic = topic.into();
        if self.topics.insert(topic.clone(), handler).is_some() {
            tracing::warn!(topic = %topic, "Topic handler replaced");
        }
    }

    pub fn add_message_handler(
        &mut self,
        kind: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) {
        let kind = kind.into();
        if self.messages.insert(kind.clone(), handler).is_some() {
            tracing::warn!(message_type = %kind, "Message handler replaced");
        }
    }

    pub fn topic_handler(&self, topic: &str) -> Option<&Arc<dyn TopicHandler>> {
        self.topics.get(topic)
    }

    pub fn message_handler(&self, kind: &str) -> Option<&Arc<dyn MessageHandler>> {
        self.messages.get(kind)
    }

    /// Fold another table into this one; entries in `other` win
    pub fn merge(&mut self, other: HandlerTable) {
        for (topic, handler) in other.topics {
            self.add_topic_handler(topic, handler);
        }
        for (kind, handler) in other.messages {
            self.add_message_handler(kind, handler);
        }
    }

    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn message_types(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.messages.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}
