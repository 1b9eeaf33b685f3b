//! Session behaviour against a scripted microphone and an in-memory wire

use std::sync::{Arc, Mutex};

use mic_relay::audio::{AudioError, BlockDispatcher, SampleBlock, SampleSource, SourceFormat};
use mic_relay::pipeline::{Frame, BYTES_PER_SAMPLE};
use mic_relay::session::{CaptureSession, SessionError, SessionEvents};
use mic_relay::state_machine::State;
use mic_relay::transport::{
    ConnectionEvent, ConnectionId, ConnectionListener, ConnectionState, Connector, Endpoint,
    FrameLink, TransportError,
};

const BLOCK_SIZE: usize = 16;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct MicState {
    dispatcher: Option<BlockDispatcher>,
    deny: bool,
    acquire_calls: usize,
    release_calls: usize,
}

#[derive(Clone, Default)]
struct FakeMic(Arc<Mutex<MicState>>);

impl FakeMic {
    fn denying() -> Self {
        let mic = Self::default();
        mic.0.lock().unwrap().deny = true;
        mic
    }

    /// Deliver one block as the capture thread would
    fn speak(&self, value: f32) {
        let mut state = self.0.lock().unwrap();
        if let Some(dispatcher) = state.dispatcher.as_mut() {
            dispatcher.dispatch(SampleBlock::new(vec![value; BLOCK_SIZE]));
        }
    }
}

impl SampleSource for FakeMic {
    fn acquire(&mut self, dispatcher: BlockDispatcher) -> Result<SourceFormat, AudioError> {
        let mut state = self.0.lock().unwrap();
        state.acquire_calls += 1;
        if state.deny {
            return Err(AudioError::PermissionDenied(
                "microphone access not authorized".to_string(),
            ));
        }
        state.dispatcher = Some(dispatcher);
        Ok(SourceFormat {
            sample_rate: 16000,
            block_size: BLOCK_SIZE,
        })
    }

    fn release(&mut self) {
        let mut state = self.0.lock().unwrap();
        state.dispatcher = None;
        state.release_calls += 1;
    }
}

#[derive(Default)]
struct Wire {
    listener: Option<(ConnectionId, ConnectionListener)>,
    connects: usize,
    delivered: Vec<Frame>,
    closes: usize,
    /// Collector not reading: the link refuses frames
    stalled: bool,
}

#[derive(Clone, Default)]
struct FakeCollector(Arc<Mutex<Wire>>);

impl FakeCollector {
    fn report(&self, event: impl FnOnce(ConnectionId) -> ConnectionEvent) {
        let (id, listener) = self
            .0
            .lock()
            .unwrap()
            .listener
            .clone()
            .expect("no connection attempted");
        listener(event(id));
    }

    fn accept(&self) {
        self.report(|connection| ConnectionEvent::Opened { connection });
    }

    fn hang_up(&self) {
        self.report(|connection| ConnectionEvent::Closed {
            connection,
            reason: Some("1001 going away".to_string()),
        });
    }

    fn delivered(&self) -> Vec<Frame> {
        self.0.lock().unwrap().delivered.clone()
    }
}

struct FakeLink(Arc<Mutex<Wire>>);

impl Connector for FakeCollector {
    type Link = FakeLink;

    fn connect(
        &mut self,
        _endpoint: &Endpoint,
        connection: ConnectionId,
        listener: ConnectionListener,
    ) -> FakeLink {
        let mut wire = self.0.lock().unwrap();
        wire.connects += 1;
        wire.listener = Some((connection, listener));
        FakeLink(self.0.clone())
    }
}

impl FrameLink for FakeLink {
    fn write(&mut self, frame: Frame) -> Result<(), TransportError> {
        let mut wire = self.0.lock().unwrap();
        if wire.stalled {
            return Err(TransportError::Backpressure);
        }
        wire.delivered.push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.0.lock().unwrap().closes += 1;
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    session: CaptureSession<FakeMic, FakeCollector>,
    events: SessionEvents,
    mic: FakeMic,
    collector: FakeCollector,
}

impl Harness {
    fn new() -> Self {
        Self::with_mic(FakeMic::default())
    }

    fn with_mic(mic: FakeMic) -> Self {
        let collector = FakeCollector::default();
        let (session, events) =
            CaptureSession::new(mic.clone(), collector.clone(), Endpoint::default());
        Self {
            session,
            events,
            mic,
            collector,
        }
    }

    /// Start, then let the collector accept the connection
    fn start_connected(&mut self) {
        self.session.start().unwrap();
        self.collector.accept();
        self.pump();
        assert_eq!(self.session.connection_state(), ConnectionState::Open);
    }

    /// Process everything queued for the session loop
    fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.session.handle_event(event);
        }
    }

    fn speak(&mut self, value: f32) {
        self.mic.speak(value);
        self.pump();
    }
}

fn samples(frame: &Frame) -> Vec<f32> {
    frame
        .as_bytes()
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn three_blocks_then_stop_delivers_three_frames() {
    let mut h = Harness::new();
    h.start_connected();

    h.speak(0.1);
    h.speak(0.2);
    h.speak(0.3);
    h.session.stop();

    let delivered = h.collector.delivered();
    assert_eq!(delivered.len(), 3);
    for (frame, expected) in delivered.iter().zip([0.1f32, 0.2, 0.3]) {
        assert_eq!(frame.len(), BLOCK_SIZE * BYTES_PER_SAMPLE);
        assert_eq!(samples(frame), vec![expected; BLOCK_SIZE]);
    }

    assert_eq!(h.collector.0.lock().unwrap().closes, 1);
    assert_eq!(h.session.connection_state(), ConnectionState::Closed);
    assert!(matches!(h.session.state(), State::Stopped { .. }));
}

#[test]
fn muted_blocks_never_reach_the_wire() {
    let mut h = Harness::new();
    h.start_connected();

    h.session.mute();
    h.speak(0.5);
    h.speak(0.5);
    h.session.unmute();
    h.speak(0.9);
    h.session.stop();

    let delivered = h.collector.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(samples(&delivered[0]), vec![0.9; BLOCK_SIZE]);

    let summary = h.session.status().last_recording.unwrap();
    assert_eq!(summary.stats.blocks_received, 3);
    assert_eq!(summary.stats.frames_muted, 2);
    assert_eq!(summary.stats.frames_forwarded, 1);
}

#[test]
fn start_while_recording_fails_and_leaves_session_untouched() {
    let mut h = Harness::new();
    h.start_connected();
    let before = h.session.state().clone();

    let err = h.session.start().unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));
    assert_eq!(*h.session.state(), before);
    assert_eq!(h.mic.0.lock().unwrap().acquire_calls, 1);
    assert_eq!(h.collector.0.lock().unwrap().connects, 1);

    // Still streaming on the original connection
    h.speak(0.25);
    assert_eq!(h.collector.delivered().len(), 1);
}

#[test]
fn denied_microphone_fails_start_without_connecting() {
    let mut h = Harness::with_mic(FakeMic::denying());

    let err = h.session.start().unwrap_err();
    assert!(matches!(
        err,
        SessionError::Device(AudioError::PermissionDenied(_))
    ));
    assert_eq!(*h.session.state(), State::Idle);
    assert_eq!(h.collector.0.lock().unwrap().connects, 0);
    assert_eq!(h.session.connection_state(), ConnectionState::Idle);

    // Retry once permission is granted
    h.mic.0.lock().unwrap().deny = false;
    h.start_connected();
    assert!(h.session.state().is_recording());
}

#[test]
fn block_after_remote_close_is_dropped_silently() {
    let mut h = Harness::new();
    h.start_connected();
    h.speak(0.1);

    h.collector.hang_up();
    h.pump();
    assert_eq!(h.session.connection_state(), ConnectionState::Closed);
    assert!(h.session.state().is_recording());

    h.speak(0.2);

    assert_eq!(h.collector.delivered().len(), 1);
    assert_eq!(h.session.transport_stats().frames_dropped, 1);
    assert_eq!(h.session.stats().frames_forwarded, 2);

    h.session.stop();
    assert!(matches!(h.session.state(), State::Stopped { .. }));
}

#[test]
fn stalled_collector_drops_frames_instead_of_queueing() {
    let mut h = Harness::new();
    h.start_connected();
    h.speak(0.1);

    h.collector.0.lock().unwrap().stalled = true;
    for _ in 0..100 {
        h.speak(0.2);
    }
    assert_eq!(h.session.connection_state(), ConnectionState::Open);
    assert_eq!(h.session.transport_stats().frames_dropped, 100);

    // Collector recovers: only fresh audio arrives
    h.collector.0.lock().unwrap().stalled = false;
    h.speak(0.3);

    let delivered = h.collector.delivered();
    assert_eq!(delivered.len(), 2);
    assert_eq!(samples(&delivered[1]), vec![0.3; BLOCK_SIZE]);
    assert_eq!(h.session.transport_stats().frames_written, 2);
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn stop_is_idempotent() {
    let mut h = Harness::new();
    h.start_connected();

    h.session.stop();
    let once = h.session.state().clone();
    h.session.stop();

    assert_eq!(*h.session.state(), once);
    assert_eq!(h.mic.0.lock().unwrap().release_calls, 1);
    assert_eq!(h.collector.0.lock().unwrap().closes, 1);
}

#[test]
fn stop_before_start_is_a_noop() {
    let mut h = Harness::new();
    h.session.stop();
    h.session.mute();
    h.session.unmute();

    assert_eq!(*h.session.state(), State::Idle);
    assert!(!h.session.is_muted());
}

#[test]
fn mute_then_unmute_without_blocks_changes_nothing() {
    let mut with_toggle = Harness::new();
    with_toggle.start_connected();
    with_toggle.session.mute();
    with_toggle.session.unmute();
    with_toggle.speak(0.4);
    with_toggle.speak(0.6);

    let mut plain = Harness::new();
    plain.start_connected();
    plain.speak(0.4);
    plain.speak(0.6);

    assert_eq!(with_toggle.collector.delivered(), plain.collector.delivered());
}

#[test]
fn blocks_queued_before_stop_are_not_sent() {
    let mut h = Harness::new();
    h.start_connected();

    // Produced on the capture side but not yet processed
    h.mic.speak(0.7);
    h.session.stop();
    h.pump();

    assert!(h.collector.delivered().is_empty());
}

#[test]
fn restart_after_stop_uses_a_fresh_connection() {
    let mut h = Harness::new();
    h.start_connected();
    let first = h.session.state().recording_id();
    h.speak(0.1);
    h.session.stop();

    h.start_connected();
    assert_ne!(h.session.state().recording_id(), first);
    h.speak(0.2);

    let wire = h.collector.0.lock().unwrap();
    assert_eq!(wire.connects, 2);
    assert_eq!(wire.delivered.len(), 2);
    assert_eq!(h.session.stats().frames_forwarded, 1);
}

#[test]
fn muted_flag_is_cleared_by_stop() {
    let mut h = Harness::new();
    h.start_connected();
    h.session.mute();
    assert!(h.session.is_muted());

    h.session.stop();
    assert!(!h.session.is_muted());

    h.start_connected();
    assert!(!h.session.is_muted());
}
