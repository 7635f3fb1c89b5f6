//! WebSocket Real-Time Streaming
//!
//! Pushes live sensor envelopes to subscribed clients.
//!
//! ## Architecture
//!
//! - **ConnectionRegistry**: live connections, bucketed by topic
//! - **Broadcaster**: fans an envelope out to a topic's subscribers
//! - **Session**: per-connection state machine behind the upgrade handler
//! - **HandlerTable**: topic snapshots and message types added by plugins
//!
//! ## Protocol
//!
//! A client connects to `/` (or `/ws`) and sends the topic it wants as a
//! plain text frame. From then on it receives `{"event": ..., "data": ...}`
//! frames for that topic and may send `{"type": ..., "data": ...}` messages.
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8080/');
//! ws.onopen = () => ws.send('multiSensor');
//! ws.onmessage = (event) => console.log(JSON.parse(event.data));
//! ```

mod broadcaster;
mod handler;
mod handlers;
mod messages;
mod registry;

pub use broadcaster::{Broadcaster, DeliveryConfig};
pub use handler::{upgrade, websocket_handler, Flow, Session, SessionState};
pub use handlers::{HandlerTable, MessageError, MessageHandler, TopicHandler};
pub use messages::{ClientMessage, Envelope, ERROR_EVENT, PONG_EVENT};
pub use registry::{
    ConnectionHandle, ConnectionId, ConnectionRegistry, DeliveryFailure, RegistryError,
};
