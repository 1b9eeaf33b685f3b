use serde::Serialize;
use thiserror::Error;

use super::subscription::BlockDispatcher;

/// Errors that can occur while acquiring the microphone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("No audio input device found")]
    NoInputDevice,

    #[error("Audio input device not found: '{requested}'. {available}")]
    DeviceNotFound { requested: String, available: String },

    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("No supported audio configuration")]
    NoSupportedConfig,

    #[error("Failed to create audio stream: {0}")]
    StreamCreationFailed(String),
}

/// Format of the blocks a source delivers once acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFormat {
    pub sample_rate: u32,
    pub block_size: usize,
}

/// A mono microphone input producing fixed-size blocks.
///
/// `acquire` takes the dispatcher that every completed block must be handed
/// to, in capture order, until `release` is called. `release` must be
/// idempotent and safe to call on a source that was never acquired.
pub trait SampleSource: Send + 'static {
    fn acquire(&mut self, dispatcher: BlockDispatcher) -> Result<SourceFormat, AudioError>;

    fn release(&mut self);
}
