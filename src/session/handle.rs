//! Cloneable front door to a running session loop

use tokio::sync::{mpsc, oneshot, watch};

use super::capture::{CaptureSession, SessionEvents};
use super::{SessionError, SessionEvent, SessionStatus};
use crate::audio::SampleSource;
use crate::state_machine::Command;
use crate::transport::Connector;

/// Sends commands to the session loop and observes its status
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    pub(super) fn new(
        tx: mpsc::UnboundedSender<SessionEvent>,
        status: watch::Receiver<SessionStatus>,
    ) -> Self {
        Self { tx, status }
    }

    /// Start recording and wait for the outcome
    pub async fn start(&self) -> Result<(), SessionError> {
        self.request(Command::Start).await
    }

    pub async fn stop(&self) {
        self.notify(Command::Stop).await;
    }

    pub async fn mute(&self) {
        self.notify(Command::Mute).await;
    }

    pub async fn unmute(&self) {
        self.notify(Command::Unmute).await;
    }

    /// Latest published status
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Ask the loop to stop recording and exit
    pub fn shutdown(&self) {
        if self.tx.send(SessionEvent::Shutdown).is_err() {
            log::debug!("SessionHandle: loop already gone");
        }
    }

    async fn request(&self, command: Command) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionEvent::Command {
                command,
                reply: Some(reply),
            })
            .map_err(|_| SessionError::LoopClosed)?;
        rx.await.unwrap_or(Err(SessionError::LoopClosed))
    }

    async fn notify(&self, command: Command) {
        if let Err(e) = self.request(command).await {
            log::debug!("SessionHandle: {} not applied: {}", command, e);
        }
    }
}

/// Drain session events until shutdown, then stop any active recording
pub async fn run_session_loop<S, C>(mut session: CaptureSession<S, C>, mut events: SessionEvents)
where
    S: SampleSource,
    C: Connector,
{
    log::info!("Session loop started (endpoint {})", session.endpoint());

    while let Some(event) = events.recv().await {
        if matches!(event, SessionEvent::Shutdown) {
            log::info!("Session loop: shutdown requested");
            break;
        }
        session.handle_event(event);
    }

    session.stop();
    log::info!("Session loop ended");
}
