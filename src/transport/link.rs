use std::sync::Arc;

use super::{ConnectionEvent, ConnectionId, Endpoint, TransportError};
use crate::pipeline::Frame;

/// Callback through which a connection reports its lifecycle.
/// Invoked from whatever task drives the connection.
pub type ConnectionListener = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

/// Starts outbound connections.
///
/// `connect` must return immediately. Establishment happens in the
/// background and is reported through `listener`, tagged with `connection`.
pub trait Connector: Send + 'static {
    type Link: FrameLink;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
        connection: ConnectionId,
        listener: ConnectionListener,
    ) -> Self::Link;
}

/// Write half of one connection attempt
pub trait FrameLink: Send + 'static {
    /// Hand a frame to the wire without waiting. Only called while the
    /// connection is open. Returns `Backpressure` instead of queueing when
    /// the wire is not keeping up.
    fn write(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Tear the connection down, whatever stage it reached. Idempotent.
    fn close(&mut self);
}
