//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and drives each connection through
//! its lifecycle: awaiting a topic, subscribed, closed.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::handlers::{HandlerTable, MessageError};
use super::messages::{ClientMessage, Envelope};
use super::registry::{ConnectionHandle, ConnectionRegistry};
use crate::api::AppState;

/// WebSocket upgrade handler
///
/// This is the entry point for WebSocket connections.
/// It upgrades the HTTP connection to WebSocket and starts message handling.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    upgrade(ws, state)
}

/// Upgrade a request into a subscriber connection
pub fn upgrade(ws: WebSocketUpgrade, state: Arc<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Upgraded; the next text message names the topic
    AwaitingTopic,
    /// Registered under `topic`
    Subscribed { topic: String },
    Closed,
}

/// Whether the read loop should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Per-connection state machine, independent of the socket itself
pub struct Session {
    connection: ConnectionHandle,
    state: SessionState,
    registry: Arc<ConnectionRegistry>,
    handlers: Arc<HandlerTable>,
}

impl Session {
    pub fn new(
        connection: ConnectionHandle,
        registry: Arc<ConnectionRegistry>,
        handlers: Arc<HandlerTable>,
    ) -> Self {
        Self {
            connection,
            state: SessionState::AwaitingTopic,
            registry,
            handlers,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn id(&self) -> &str {
        self.connection.id()
    }

    /// Handle one inbound frame
    pub async fn on_message(&mut self, message: Message) -> Flow {
        match message {
            Message::Text(text) => match self.state.clone() {
                SessionState::AwaitingTopic => self.subscribe(&text).await,
                SessionState::Subscribed { topic } => {
                    self.dispatch(&topic, &text).await;
                    Flow::Continue
                }
                SessionState::Closed => Flow::Close,
            },
            Message::Binary(_) => {
                self.reply_error(&MessageError::MalformedMessage(
                    "Binary messages not supported".to_string(),
                ));
                Flow::Continue
            }
            // Axum answers pings itself
            Message::Ping(_) | Message::Pong(_) => Flow::Continue,
            Message::Close(_) => {
                tracing::debug!(connection_id = %self.id(), "Client requested close");
                Flow::Close
            }
        }
    }

    /// Transition to Closed and leave the registry; safe to call repeatedly
    pub async fn on_disconnect(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.registry.unregister(self.connection.id()).await;
    }

    async fn subscribe(&mut self, raw: &str) -> Flow {
        let topic = raw.trim();
        if topic.is_empty() {
            self.reply_error(&MessageError::MalformedMessage(
                "Expected a topic name".to_string(),
            ));
            return Flow::Continue;
        }

        // Queue the initial snapshot before registering so it precedes any broadcast
        if let Some(handler) = self.handlers.topic_handler(topic) {
            if let Some(initial) = handler.on_subscribe(topic).await {
                self.reply(initial);
            }
        }

        match self.registry.register(self.connection.clone(), topic).await {
            Ok(()) => {
                self.state = SessionState::Subscribed {
                    topic: topic.to_string(),
                };
                Flow::Continue
            }
            Err(e) => {
                tracing::error!(connection_id = %self.id(), error = %e, "Subscribe error");
                self.reply_error(&MessageError::Handler(e.to_string()));
                Flow::Close
            }
        }
    }

    async fn dispatch(&self, topic: &str, raw: &str) {
        let message = match serde_json::from_str::<ClientMessage>(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(
                    connection_id = %self.id(),
                    error = %e,
                    text = %raw,
                    "Invalid client message"
                );
                self.reply_error(&MessageError::MalformedMessage(e.to_string()));
                return;
            }
        };

        if message.is_ping() {
            self.reply(Envelope::pong());
            return;
        }

        let Some(handler) = self.handlers.message_handler(&message.kind) else {
            self.reply_error(&MessageError::UnknownType(message.kind));
            return;
        };

        match handler.handle(self.id(), topic, message.data).await {
            Ok(Some(envelope)) => self.reply(envelope),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(
                    connection_id = %self.id(),
                    message_type = %message.kind,
                    error = %e,
                    "Message handler failed"
                );
                self.reply_error(&e);
            }
        }
    }

    fn reply(&self, envelope: Envelope) {
        if let Err(e) = self.connection.try_deliver(Arc::new(envelope)) {
            tracing::debug!(connection_id = %self.id(), error = %e, "Reply dropped");
        }
    }

    fn reply_error(&self, error: &MessageError) {
        self.reply(Envelope::error(error.to_string()));
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    drive_connection(sender, receiver, state).await;
}

/// Run one connection from its two socket halves until either side ends
async fn drive_connection<S, R, E>(sender: S, mut receiver: R, state: Arc<AppState>)
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let delivery = state.broadcaster.config().clone();

    let (tx, rx) = mpsc::channel::<Arc<Envelope>>(delivery.queue_capacity);
    let connection_id = Uuid::new_v4().to_string();
    let connection = ConnectionHandle::new(connection_id.clone(), tx);

    tracing::info!(connection_id = %connection_id, "WebSocket connected");

    let mut send_task = tokio::spawn(write_loop(
        sender,
        rx,
        delivery.write_timeout,
        connection_id.clone(),
    ));

    let mut session = Session::new(
        connection,
        Arc::clone(state.broadcaster.registry()),
        Arc::clone(&state.handlers),
    );
    let topic_timeout = state.config.server.topic_timeout();

    let recv = async {
        loop {
            let next = match (session.state(), topic_timeout) {
                (SessionState::AwaitingTopic, Some(limit)) => {
                    match tokio::time::timeout(limit, receiver.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            tracing::debug!(
                                connection_id = %session.id(),
                                "No topic received in time"
                            );
                            break;
                        }
                    }
                }
                _ => receiver.next().await,
            };

            match next {
                Some(Ok(message)) => {
                    if session.on_message(message).await == Flow::Close {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(
                        connection_id = %session.id(),
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => break,
            }
        }
    };

    // Whichever side finishes first ends the connection
    tokio::select! {
        _ = &mut send_task => {}
        _ = recv => {
            send_task.abort();
        }
    }

    session.on_disconnect().await;
    tracing::info!(connection_id = %connection_id, "WebSocket disconnected");
}

/// Drain the outbound queue into the socket
async fn write_loop<S>(
    mut sender: S,
    mut rx: mpsc::Receiver<Arc<Envelope>>,
    write_timeout: Duration,
    connection_id: String,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(envelope) = rx.recv().await {
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize envelope");
                continue;
            }
        };

        match tokio::time::timeout(write_timeout, sender.send(Message::Text(text))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket send failed, closing connection"
                );
                break;
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    timeout_ms = write_timeout.as_millis() as u64,
                    "WebSocket write timed out, closing connection"
                );
                break;
            }
        }
    }
}
