//! WebSocket connector for the remote collector
//!
//! # Connection Flow
//!
//! 1. `connect()` - spawn a task that dials the endpoint, return a link at once
//! 2. task reports `Opened`, then writes each frame as one binary message
//! 3. text messages from the collector are logged, a close frame ends the task
//! 4. `close()` on the link (or dropping it) sends a close frame
//!
//! The link holds at most `LINK_QUEUE_DEPTH` frames. When the collector stops
//! reading, the socket fills, the queue fills, and `write` reports
//! `Backpressure` so the frame is dropped rather than delivered late.
//!
//! No connect timeout and no retries: a dial that never completes simply
//! leaves the transport in `Connecting` until the session stops.

use std::fmt;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{client::IntoClientRequest, Message},
};

use super::link::{ConnectionListener, Connector, FrameLink};
use super::{ConnectionEvent, ConnectionId, Endpoint, TransportError};
use crate::pipeline::Frame;

/// Frames allowed between the session and the socket
pub const LINK_QUEUE_DEPTH: usize = 4;

/// Log progress every this many frames
const PROGRESS_INTERVAL: u64 = 50;

/// Upper bound on the close handshake with a stalled collector
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens tokio-tungstenite connections on the current tokio runtime
#[derive(Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    type Link = WsLink;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
        connection: ConnectionId,
        listener: ConnectionListener,
    ) -> WsLink {
        let (tx, rx) = mpsc::channel(LINK_QUEUE_DEPTH);
        let (close_tx, close_rx) = oneshot::channel();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(run_connection(
                    endpoint.clone(),
                    connection,
                    rx,
                    close_rx,
                    listener,
                ));
            }
            Err(e) => {
                listener(ConnectionEvent::Errored {
                    connection,
                    message: TransportError::ConnectionFailed(e.to_string()).to_string(),
                });
            }
        }

        WsLink {
            tx,
            close: Some(close_tx),
        }
    }
}

/// Write half handed back to the transport
pub struct WsLink {
    tx: mpsc::Sender<Frame>,
    close: Option<oneshot::Sender<()>>,
}

impl FrameLink for WsLink {
    fn write(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => {
                TransportError::Disconnected("connection task has ended".to_string())
            }
        })
    }

    fn close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

/// Drive one connection from dial to close
async fn run_connection(
    endpoint: Endpoint,
    connection: ConnectionId,
    mut outgoing: mpsc::Receiver<Frame>,
    mut close_rx: oneshot::Receiver<()>,
    listener: ConnectionListener,
) {
    let report_error = |err: TransportError| {
        log::warn!("WsConnector: {}", err);
        listener(ConnectionEvent::Errored {
            connection,
            message: err.to_string(),
        });
    };

    let request = match endpoint.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            report_error(TransportError::InvalidEndpoint(e.to_string()));
            return;
        }
    };

    // A dropped link resolves `close_rx` as well
    let ws_stream = tokio::select! {
        result = connect_async_with_config(request, None, true) => match result {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                report_error(TransportError::ConnectionFailed(e.to_string()));
                return;
            }
        },
        _ = &mut close_rx => {
            log::debug!("WsConnector: {} closed before it connected", connection);
            return;
        }
    };

    log::info!("WsConnector: connected to {}", endpoint);
    listener(ConnectionEvent::Opened { connection });

    let (mut write, mut read) = ws_stream.split();
    let mut frames_written: u64 = 0;

    loop {
        // Queued frames go out before a pending close
        tokio::select! {
            biased;
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    log::debug!("WsConnector: collector says: {}", text);
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| format!("{} {}", u16::from(f.code), f.reason));
                    // Flushes the close reply tungstenite queued on receipt
                    finish_close(&mut write, connection).await;
                    listener(ConnectionEvent::Closed { connection, reason });
                    return;
                }
                Some(Ok(_)) => {} // Ignore ping/pong/binary
                Some(Err(e)) => {
                    report_error(TransportError::Disconnected(e.to_string()));
                    return;
                }
                None => {
                    listener(ConnectionEvent::Closed {
                        connection,
                        reason: None,
                    });
                    return;
                }
            },
            next = outgoing.recv() => {
                let Some(frame) = next else {
                    finish_close(&mut write, connection).await;
                    return;
                };
                tokio::select! {
                    result = write.send(Message::Binary(frame.into_vec())) => {
                        if let Err(e) = result {
                            report_error(TransportError::SendFailed(e.to_string()));
                            return;
                        }
                    }
                    _ = &mut close_rx => {
                        log::debug!(
                            "WsConnector: {} closed while the collector was not reading",
                            connection
                        );
                        return;
                    }
                }
                frames_written += 1;
                if frames_written % PROGRESS_INTERVAL == 0 {
                    log::debug!("WsConnector: {} frames written", frames_written);
                }
            },
            _ = &mut close_rx => {
                finish_close(&mut write, connection).await;
                log::info!(
                    "WsConnector: {} closed after {} frames",
                    connection,
                    frames_written
                );
                return;
            }
        }
    }
}

/// Send (or answer) the close frame, giving up after `CLOSE_TIMEOUT`
async fn finish_close<S>(write: &mut S, connection: ConnectionId)
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    match tokio::time::timeout(CLOSE_TIMEOUT, write.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::debug!("WsConnector: {} close: {}", connection, e),
        Err(_) => log::warn!("WsConnector: {} close handshake timed out", connection),
    }
}
