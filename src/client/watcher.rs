//! Topic Watcher
//!
//! Connects to a sensorcast server, declares a topic and forwards every
//! envelope to a channel, reconnecting per [`ReconnectPolicy`].

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::reconnect::{NextStep, ReconnectMachine, ReconnectPolicy, NORMAL_CLOSURE};
use super::ClientError;
use crate::websocket::Envelope;

/// Map an `http`/`https` server URL to its `ws`/`wss` equivalent
pub fn to_ws_url(server: &str) -> Result<String, ClientError> {
    let server = server.trim();
    let converted = if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if server.starts_with("ws://") || server.starts_with("wss://") {
        server.to_string()
    } else {
        return Err(ClientError::InvalidUrl(server.to_string()));
    };

    // Host-only URLs upgrade at the root
    let host_part = converted.split_once("://").map(|(_, rest)| rest).unwrap_or_default();
    if host_part.is_empty() {
        return Err(ClientError::InvalidUrl(server.to_string()));
    }
    if host_part.contains('/') {
        Ok(converted)
    } else {
        Ok(format!("{}/", converted))
    }
}

pub struct TopicWatcher {
    url: String,
    topic: String,
    policy: ReconnectPolicy,
}

impl TopicWatcher {
    pub fn new(server: &str, topic: impl Into<String>) -> Result<Self, ClientError> {
        Ok(Self {
            url: to_ws_url(server)?,
            topic: topic.into(),
            policy: ReconnectPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Watch until the server closes cleanly or `tx`'s receiver is dropped
    pub async fn run(&self, tx: mpsc::Sender<Envelope>) -> Result<(), ClientError> {
        let mut machine = ReconnectMachine::new(self.policy);

        loop {
            let step = match self.session(&mut machine, &tx).await {
                Ok(code) => {
                    tracing::info!(url = %self.url, code = ?code, "Connection closed");
                    machine.on_close(code)
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "Connection error");
                    machine.on_error()
                }
            };

            match step {
                NextStep::RetryAfter(delay) => {
                    tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnecting");
                    tokio::time::sleep(delay).await;
                    machine.on_retry();
                }
                NextStep::Stop => return Ok(()),
                NextStep::Continue => {}
            }
        }
    }

    /// One connection: subscribe, forward envelopes, report the close code
    pub async fn session(
        &self,
        machine: &mut ReconnectMachine,
        tx: &mpsc::Sender<Envelope>,
    ) -> Result<Option<u16>, ClientError> {
        let (stream, _) = connect_async(self.url.as_str()).await?;
        machine.on_open();
        tracing::info!(url = %self.url, topic = %self.topic, "Connected");

        let (mut sink, mut source) = stream.split();
        sink.send(Message::Text(self.topic.clone())).await?;

        while let Some(message) = source.next().await {
            match message? {
                Message::Text(text) => {
                    let envelope = match serde_json::from_str::<Envelope>(&text) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            tracing::warn!(error = %e, "Skipping malformed envelope");
                            continue;
                        }
                    };
                    if tx.send(envelope).await.is_err() {
                        machine.shutdown();
                        let _ = sink.send(Message::Close(None)).await;
                        return Ok(Some(NORMAL_CLOSURE));
                    }
                }
                Message::Close(frame) => return Ok(frame.map(|f| u16::from(f.code))),
                _ => {}
            }
        }

        Ok(None)
    }
}
