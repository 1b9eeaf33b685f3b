//! Capture session: the only component the operator talks to
//!
//! # Architecture
//!
//! ```text
//! CPAL thread ──Block──┐
//! WS task ──Connection─┼──▶ session loop ──▶ CaptureSession
//! SessionHandle ─Command┘    (one event at a time)
//! ```
//!
//! Every input reaches the session as a `SessionEvent` and is processed to
//! completion before the next, so the mute flag needs no lock
//! and a block can never interleave with a stop.

mod capture;
mod handle;

pub use capture::{CaptureSession, SessionEvents, BLOCK_QUEUE_DEPTH};
pub use handle::{run_session_loop, SessionHandle};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::audio::{AudioError, SampleBlock};
use crate::metrics::{RecordingSummary, SessionStats};
use crate::state_machine::{Command, State};
use crate::transport::{ConnectionEvent, ConnectionState};

/// Errors surfaced to the operator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Microphone missing or access denied. The session stays where it was.
    #[error("Microphone unavailable: {0}")]
    Device(#[from] AudioError),

    #[error("Cannot {command} while {state}")]
    InvalidState {
        command: Command,
        state: &'static str,
    },

    #[error("Session loop is not running")]
    LoopClosed,
}

/// Everything the session loop processes
#[derive(Debug)]
pub enum SessionEvent {
    /// Operator command, with an optional reply channel for the result
    Command {
        command: Command,
        reply: Option<oneshot::Sender<Result<(), SessionError>>>,
    },
    /// A block produced under the given subscription
    Block {
        subscription: Uuid,
        block: SampleBlock,
    },
    /// Transport lifecycle change
    Connection(ConnectionEvent),
    /// Stop recording and end the session loop
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    Recording,
    Stopped,
}

impl From<&State> for SessionPhase {
    fn from(state: &State) -> Self {
        match state {
            State::Idle => SessionPhase::Idle,
            State::Recording { .. } => SessionPhase::Recording,
            State::Stopped { .. } => SessionPhase::Stopped,
        }
    }
}

/// Snapshot published to observers after every transition and connection change.
/// Uses camelCase JSON: { "phase": "recording", "muted": false, ... }
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub recording_id: Option<Uuid>,
    pub muted: bool,
    pub connection: ConnectionState,
    pub stats: SessionStats,
    pub last_recording: Option<RecordingSummary>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            recording_id: None,
            muted: false,
            connection: ConnectionState::Idle,
            stats: SessionStats::default(),
            last_recording: None,
        }
    }
}
