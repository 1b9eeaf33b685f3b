//! Session effect runner and per-block pipeline
//!
//! `CaptureSession` executes the effects `reduce()` asks for, in order, and
//! commits the next state only once they all succeeded. It also runs the
//! per-block path: encode, gate on the current mute flag, send.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::handle::SessionHandle;
use super::{SessionError, SessionEvent, SessionPhase, SessionStatus};
use crate::audio::{subscribe, SampleBlock, SampleSource, SourceFormat, Subscription};
use crate::metrics::{MetricsCollector, SessionStats};
use crate::pipeline::{FrameEncoder, MuteGate};
use crate::state_machine::{reduce, Command, Effect, State};
use crate::transport::{
    ConnectionListener, ConnectionState, Connector, Endpoint, Transport, TransportStats,
};

/// Blocks allowed to wait for the session loop before the capture side drops them
pub const BLOCK_QUEUE_DEPTH: usize = 32;

/// Receiving end of the session's event channels.
///
/// Commands and connection events are never dropped. Blocks travel on a
/// separate bounded queue filled with `try_send` from the capture thread and
/// are taken first, so a block produced before a command is processed before it.
pub struct SessionEvents {
    events: mpsc::UnboundedReceiver<SessionEvent>,
    blocks: mpsc::Receiver<SessionEvent>,
}

impl SessionEvents {
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            biased;
            Some(block) = self.blocks.recv() => Some(block),
            event = self.events.recv() => event,
        }
    }

    pub fn try_recv(&mut self) -> Result<SessionEvent, mpsc::error::TryRecvError> {
        self.blocks.try_recv().or_else(|_| self.events.try_recv())
    }
}

pub struct CaptureSession<S: SampleSource, C: Connector> {
    endpoint: Endpoint,
    state: State,
    source: S,
    transport: Transport<C>,
    encoder: Option<FrameEncoder>,
    /// Subscription whose blocks are currently accepted
    subscription: Option<Subscription>,
    /// Acquired but not yet active (between AcquireSource and Subscribe)
    staged: Option<(Subscription, SourceFormat)>,
    metrics: MetricsCollector,
    events: mpsc::UnboundedSender<SessionEvent>,
    blocks: mpsc::Sender<SessionEvent>,
    /// Blocks the capture side dropped because the queue was full
    overflowed: Arc<AtomicU64>,
    status: watch::Sender<SessionStatus>,
}

impl<S: SampleSource, C: Connector> CaptureSession<S, C> {
    /// Create an idle session and the event channel that drives it
    pub fn new(source: S, connector: C, endpoint: Endpoint) -> (Self, SessionEvents) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (blocks, blocks_rx) = mpsc::channel(BLOCK_QUEUE_DEPTH);
        let (status, _) = watch::channel(SessionStatus::default());

        let session = Self {
            endpoint,
            state: State::Idle,
            source,
            transport: Transport::new(connector),
            encoder: None,
            subscription: None,
            staged: None,
            metrics: MetricsCollector::new(),
            events,
            blocks,
            overflowed: Arc::new(AtomicU64::new(0)),
            status,
        };

        let rx = SessionEvents {
            events: events_rx,
            blocks: blocks_rx,
        };
        (session, rx)
    }

    /// Handle for issuing commands through the session loop
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.events.clone(), self.status.subscribe())
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_muted(&self) -> bool {
        self.state.is_muted()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn stats(&self) -> SessionStats {
        self.metrics.stats()
    }

    pub fn transport_stats(&self) -> TransportStats {
        self.transport.stats()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: SessionPhase::from(&self.state),
            recording_id: self.state.recording_id(),
            muted: self.state.is_muted(),
            connection: self.transport.state(),
            stats: self.metrics.stats(),
            last_recording: self.metrics.last_recording().cloned(),
        }
    }

    /// Start recording. Fails with `Device` if the microphone cannot be
    /// acquired, or `InvalidState` if already recording.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.execute(Command::Start).map_err(|e| {
            log::warn!("Session: start failed: {}", e);
            e
        })
    }

    /// Stop recording. Never fails; a no-op unless recording.
    pub fn stop(&mut self) {
        self.absorb(Command::Stop);
    }

    pub fn mute(&mut self) {
        self.absorb(Command::Mute);
    }

    pub fn unmute(&mut self) {
        self.absorb(Command::Unmute);
    }

    /// Process one event from the session loop
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Command { command, reply } => {
                let result = match command {
                    Command::Start => self.start(),
                    other => {
                        self.absorb(other);
                        Ok(())
                    }
                };
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            SessionEvent::Block {
                subscription,
                block,
            } => self.process_block(subscription, block),
            SessionEvent::Connection(event) => {
                self.transport.handle_event(event);
                self.publish_status();
            }
            SessionEvent::Shutdown => self.stop(),
        }
    }

    fn absorb(&mut self, command: Command) {
        if let Err(e) = self.execute(command) {
            log::warn!("Session: ignoring {}: {}", command, e);
        }
    }

    fn execute(&mut self, command: Command) -> Result<(), SessionError> {
        let (next, effects) = reduce(&self.state, command)?;

        let mut emit = false;
        for effect in effects {
            match effect {
                Effect::EmitStatus => emit = true,
                other => self.run_effect(other)?,
            }
        }

        if std::mem::discriminant(&self.state) != std::mem::discriminant(&next) {
            log::info!("Session: {} -> {}", self.state.name(), next.name());
        } else if self.state != next {
            log::info!("Session: {}", if next.is_muted() { "muted" } else { "unmuted" });
        }
        self.state = next;

        if emit {
            self.publish_status();
        }
        Ok(())
    }

    fn run_effect(&mut self, effect: Effect) -> Result<(), SessionError> {
        match effect {
            Effect::AcquireSource { id } => {
                let blocks = self.blocks.clone();
                let overflowed = self.overflowed.clone();
                overflowed.store(0, Ordering::Relaxed);
                let (subscription, dispatcher) = subscribe(move |subscription, block| {
                    let event = SessionEvent::Block {
                        subscription,
                        block,
                    };
                    if let Err(mpsc::error::TrySendError::Full(_)) = blocks.try_send(event) {
                        overflowed.fetch_add(1, Ordering::Relaxed);
                    }
                });
                let format = self.source.acquire(dispatcher)?;
                log::debug!(
                    "Session: recording {} acquired source ({} Hz, {} samples/block)",
                    id,
                    format.sample_rate,
                    format.block_size
                );
                self.staged = Some((subscription, format));
            }
            Effect::BuildEncoder { .. } => {
                self.encoder = self
                    .staged
                    .as_ref()
                    .map(|(_, format)| FrameEncoder::new(*format));
            }
            Effect::OpenTransport { .. } => {
                let events = self.events.clone();
                let listener: ConnectionListener = Arc::new(move |event| {
                    let _ = events.send(SessionEvent::Connection(event));
                });
                self.transport.open(&self.endpoint, listener);
            }
            Effect::Subscribe { id } => {
                if let Some((subscription, _)) = self.staged.take() {
                    self.subscription = Some(subscription);
                    self.metrics.start_recording(id);
                }
            }
            Effect::Unsubscribe { .. } => {
                if let Some(subscription) = self.subscription.take() {
                    subscription.cancel();
                }
                self.encoder = None;
            }
            Effect::ReleaseSource { .. } => self.source.release(),
            Effect::CloseTransport { .. } => {
                self.transport.close();
                self.collect_overflow();
                self.metrics.finish_recording(self.transport.stats());
            }
            Effect::EmitStatus => self.publish_status(),
        }
        Ok(())
    }

    fn collect_overflow(&mut self) {
        let dropped = self.overflowed.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            self.metrics.blocks_overflowed(dropped);
        }
    }

    /// Encode, gate, and send one block
    fn process_block(&mut self, subscription: Uuid, block: SampleBlock) {
        let muted = match self.state {
            State::Recording { muted, .. } => muted,
            _ => {
                log::trace!("Session: dropping block outside recording");
                return;
            }
        };

        if self.subscription.as_ref().map(Subscription::id) != Some(subscription) {
            log::trace!("Session: dropping block from stale subscription {}", subscription);
            return;
        }

        let Some(encoder) = self.encoder else {
            return;
        };

        self.collect_overflow();
        self.metrics.block_received();
        let frame = encoder.encode(&block);

        match MuteGate::forward(frame, muted) {
            Some(frame) => {
                self.metrics.frame_forwarded(frame.len());
                self.transport.send(frame);
            }
            None => self.metrics.frame_muted(),
        }
    }

    fn publish_status(&self) {
        self.status.send_replace(self.status());
    }
}

impl<S: SampleSource, C: Connector> Drop for CaptureSession<S, C> {
    fn drop(&mut self) {
        self.stop();
    }
}
