//! State machine for mic-relay
//!
//! All session transitions go through `reduce()`, a closed transition table
//! that returns the next state and the effects the session must run to get
//! there. It never performs side effects itself.

use std::fmt;

use uuid::Uuid;

use crate::session::SessionError;

/// Lifecycle state of the capture session.
/// `muted` only exists while recording.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Idle,
    Recording {
        recording_id: Uuid,
        muted: bool,
    },
    Stopped {
        recording_id: Uuid,
    },
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Recording { .. } => "recording",
            State::Stopped { .. } => "stopped",
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, State::Recording { .. })
    }

    pub fn is_muted(&self) -> bool {
        matches!(self, State::Recording { muted: true, .. })
    }

    pub fn recording_id(&self) -> Option<Uuid> {
        match self {
            State::Idle => None,
            State::Recording { recording_id, .. } | State::Stopped { recording_id } => {
                Some(*recording_id)
            }
        }
    }
}

/// Operator commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Mute,
    Unmute,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Mute => "mute",
            Command::Unmute => "unmute",
        };
        f.write_str(name)
    }
}

/// Side effects to run, in order, to complete a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Acquire the sample source for this recording
    AcquireSource { id: Uuid },
    /// Build a frame encoder for the acquired source format
    BuildEncoder { id: Uuid },
    /// Begin connecting the transport (non-blocking)
    OpenTransport { id: Uuid },
    /// Make the recording's block subscription the active one
    Subscribe { id: Uuid },
    /// Cancel the active block subscription
    Unsubscribe { id: Uuid },
    ReleaseSource { id: Uuid },
    CloseTransport { id: Uuid },
    /// Publish the new status to observers
    EmitStatus,
}

/// Reducer: (state, command) -> (next_state, effects)
///
/// Only commands the current state forbids return an error; the state is
/// unchanged in that case. Repeated stop/mute/unmute are no-ops.
pub fn reduce(state: &State, command: Command) -> Result<(State, Vec<Effect>), SessionError> {
    use Command::*;
    use Effect::*;
    use State::*;

    let invalid = || SessionError::InvalidState {
        command,
        state: state.name(),
    };

    match (state, command) {
        // -----------------
        // Idle / Stopped
        // -----------------
        (Idle | Stopped { .. }, Start) => {
            let id = Uuid::new_v4();
            Ok((
                Recording {
                    recording_id: id,
                    muted: false,
                },
                vec![
                    AcquireSource { id },
                    BuildEncoder { id },
                    OpenTransport { id },
                    Subscribe { id },
                    EmitStatus,
                ],
            ))
        }
        (Idle | Stopped { .. }, Stop) => Ok((state.clone(), vec![])),
        (Idle | Stopped { .. }, Mute | Unmute) => Err(invalid()),

        // -----------------
        // Recording
        // -----------------
        (Recording { .. }, Start) => Err(invalid()),
        (Recording { recording_id, .. }, Stop) => {
            let id = *recording_id;
            Ok((
                Stopped { recording_id: id },
                vec![
                    Unsubscribe { id },
                    ReleaseSource { id },
                    CloseTransport { id },
                    EmitStatus,
                ],
            ))
        }
        (
            Recording {
                recording_id,
                muted: false,
            },
            Mute,
        ) => Ok((
            Recording {
                recording_id: *recording_id,
                muted: true,
            },
            vec![EmitStatus],
        )),
        (
            Recording {
                recording_id,
                muted: true,
            },
            Unmute,
        ) => Ok((
            Recording {
                recording_id: *recording_id,
                muted: false,
            },
            vec![EmitStatus],
        )),
        // Already in the requested mute state
        (Recording { .. }, Mute | Unmute) => Ok((state.clone(), vec![])),
    }
}
