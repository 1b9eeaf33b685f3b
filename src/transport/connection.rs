//! Connection lifecycle and the send-only-when-open policy
//!
//! `Transport` owns at most one connection at a time. It tracks the state
//! reported by the connection's lifecycle events and is the single place
//! that decides whether a frame reaches the wire:
//!
//! - `send` while not `Open` drops the frame (no queueing, no retry)
//! - a full link queue drops the frame and leaves the connection `Open`
//! - any other write failure moves the connection to `Errored`
//! - events from a previous connection are ignored

use serde::Serialize;
use uuid::Uuid;

use super::link::{ConnectionListener, Connector, FrameLink};
use super::{ConnectionEvent, ConnectionId, ConnectionState, Endpoint, TransportError};
use crate::pipeline::Frame;

/// Counters for frames handed to `send`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportStats {
    pub frames_written: u64,
    pub bytes_written: u64,
    pub frames_dropped: u64,
}

pub struct Transport<C: Connector> {
    connector: C,
    link: Option<C::Link>,
    connection: Option<ConnectionId>,
    state: ConnectionState,
    stats: TransportStats,
}

impl<C: Connector> Transport<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            link: None,
            connection: None,
            state: ConnectionState::Idle,
            stats: TransportStats::default(),
        }
    }

    /// Begin connecting to `endpoint`. Returns immediately.
    ///
    /// Any previous connection is closed first.
    pub fn open(&mut self, endpoint: &Endpoint, listener: ConnectionListener) -> ConnectionId {
        self.close();

        let connection = Uuid::new_v4();
        log::info!("Transport: connecting to {} ({})", endpoint, connection);

        self.link = Some(self.connector.connect(endpoint, connection, listener));
        self.connection = Some(connection);
        self.state = ConnectionState::Connecting;
        self.stats = TransportStats::default();

        connection
    }

    /// Write `frame` if the connection is open, otherwise drop it silently.
    pub fn send(&mut self, frame: Frame) {
        let link = match (self.state, self.link.as_mut()) {
            (ConnectionState::Open, Some(link)) => link,
            (state, _) => {
                self.stats.frames_dropped += 1;
                log::trace!("Transport: dropping frame while {:?}", state);
                return;
            }
        };

        let len = frame.len() as u64;
        match link.write(frame) {
            Ok(()) => {
                self.stats.frames_written += 1;
                self.stats.bytes_written += len;
            }
            Err(TransportError::Backpressure) => {
                self.stats.frames_dropped += 1;
                log::trace!("Transport: link queue full, dropping frame");
            }
            Err(e) => {
                log::warn!("Transport: {}", e);
                self.stats.frames_dropped += 1;
                self.fail();
            }
        }
    }

    /// Close the connection. Safe on a never-opened or already-closed transport.
    pub fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
            log::info!(
                "Transport: closed {} ({} frames, {} bytes written, {} dropped)",
                self.connection.map(|c| c.to_string()).unwrap_or_default(),
                self.stats.frames_written,
                self.stats.bytes_written,
                self.stats.frames_dropped
            );
        }
        self.connection = None;
        if self.state != ConnectionState::Idle {
            self.state = ConnectionState::Closed;
        }
    }

    /// Apply a lifecycle event reported by the connector
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        if Some(event.connection()) != self.connection {
            log::debug!("Transport: ignoring stale event {:?}", event);
            return;
        }

        match event {
            ConnectionEvent::Opened { .. } => {
                if self.state == ConnectionState::Connecting {
                    log::info!("Transport: connection open");
                    self.state = ConnectionState::Open;
                }
            }
            ConnectionEvent::Closed { reason, .. } => {
                log::info!(
                    "Transport: closed by remote ({})",
                    reason.as_deref().unwrap_or("no reason")
                );
                self.state = ConnectionState::Closed;
                self.drop_link();
            }
            ConnectionEvent::Errored { message, .. } => {
                log::warn!("Transport: connection error: {}", message);
                self.fail();
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    fn fail(&mut self) {
        self.state = ConnectionState::Errored;
        self.drop_link();
    }

    /// Release the link but keep the connection id so late events still match
    fn drop_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
    }
}

impl<C: Connector> Drop for Transport<C> {
    fn drop(&mut self) {
        self.close();
    }
}
