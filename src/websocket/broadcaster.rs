//! Topic Broadcaster
//!
//! Fans an envelope out to every connection subscribed to a topic.
//! Delivery never waits on a socket: each connection owns a bounded queue
//! drained by its own writer task, and `publish` only enqueues. A full or
//! closed queue counts as a failed delivery and drops that connection.

use std::sync::Arc;
use std::time::Duration;

use super::messages::Envelope;
use super::registry::{ConnectionRegistry, DeliveryFailure};

/// Per-connection delivery settings
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Envelopes buffered per connection before it counts as stalled
    pub queue_capacity: usize,
    /// Longest a single socket write may take before the connection is dropped
    pub write_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            write_timeout: Duration::from_secs(2),
        }
    }
}

/// Publishes envelopes to topic subscribers
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    config: DeliveryConfig,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, config: DeliveryConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Deliver an envelope to every current subscriber of `topic`.
    ///
    /// Returns how many connections accepted it. Connections that could not
    /// take it are unregistered; nothing is reported to the caller.
    pub async fn publish(&self, topic: &str, envelope: Envelope) -> usize {
        let envelope = Arc::new(envelope);
        let subscribers = self.registry.subscribers_of(topic).await;

        let mut delivered = 0;
        for connection in subscribers {
            match connection.try_deliver(Arc::clone(&envelope)) {
                Ok(()) => delivered += 1,
                Err(failure) => {
                    tracing::debug!(
                        connection_id = %connection.id(),
                        topic = %topic,
                        error = %failure,
                        "Delivery failed, dropping connection"
                    );
                    self.registry.unregister(connection.id()).await;
                }
            }
        }

        if delivered > 0 {
            tracing::trace!(
                topic = %topic,
                event = %envelope.event(),
                subscribers = delivered,
                "Broadcast envelope"
            );
        }

        delivered
    }

    /// Deliver an envelope to one registered connection
    pub async fn send_to(&self, id: &str, envelope: Envelope) -> Result<(), DeliveryFailure> {
        let Some(topic) = self.registry.topic_of(id).await else {
            return Err(DeliveryFailure::Closed);
        };
        let target = self
            .registry
            .subscribers_of(&topic)
            .await
            .into_iter()
            .find(|c| c.id() == id)
            .ok_or(DeliveryFailure::Closed)?;

        let result = target.try_deliver(Arc::new(envelope));
        if result.is_err() {
            self.registry.unregister(id).await;
        }
        result
    }
}
