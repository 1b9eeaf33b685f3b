//! Outbound transport to the remote collector
//!
//! One duplex WebSocket connection per recording, carrying one binary
//! message per frame.
//!
//! # Architecture
//!
//! ```text
//! Session loop                       Tokio task (per connection)
//! ┌──────────────────────┐           ┌─────────────────────────┐
//! │ Transport::send()    │──channel─▶│ WsConnector             │
//! │  (drops unless Open) │           │  ├─ connect_async        │
//! │ Transport::          │◀─events───│  ├─ write Binary frames  │
//! │   handle_event()     │           │  └─ watch for Close/err  │
//! └──────────────────────┘           └─────────────────────────┘
//! ```
//!
//! There is no reconnection. Once a connection closes or errors, frames are
//! dropped until the session is stopped and started again.

mod connection;
mod endpoint;
mod link;
mod websocket;

pub use connection::{Transport, TransportStats};
pub use endpoint::{Endpoint, DEFAULT_ENDPOINT};
pub use link::{ConnectionListener, Connector, FrameLink};
pub use websocket::{WsConnector, WsLink};

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Identifies one connection attempt
pub type ConnectionId = Uuid;

/// Errors that can occur on the transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Invalid collector endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to connect to collector: {0}")]
    ConnectionFailed(String),

    #[error("Failed to send frame: {0}")]
    SendFailed(String),

    #[error("Connection to collector lost: {0}")]
    Disconnected(String),

    /// The link's outgoing queue is full; the frame was not taken
    #[error("Collector is not keeping up")]
    Backpressure,
}

/// Connection state as last observed by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// Never opened
    Idle,
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Lifecycle notification from a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened {
        connection: ConnectionId,
    },
    Closed {
        connection: ConnectionId,
        reason: Option<String>,
    },
    Errored {
        connection: ConnectionId,
        message: String,
    },
}

impl ConnectionEvent {
    pub fn connection(&self) -> ConnectionId {
        match self {
            ConnectionEvent::Opened { connection }
            | ConnectionEvent::Closed { connection, .. }
            | ConnectionEvent::Errored { connection, .. } => *connection,
        }
    }
}
