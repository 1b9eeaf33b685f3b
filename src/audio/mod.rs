//! Audio capture module for mic-relay
//!
//! This module handles microphone input and turns it into fixed-size mono
//! sample blocks. Uses CPAL for capture.

mod block;
pub mod recorder;
mod source;
mod subscription;

pub use block::{BlockAssembler, SampleBlock, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
pub use recorder::MicSource;
pub use source::{AudioError, SampleSource, SourceFormat};
pub use subscription::{subscribe, BlockDispatcher, BlockHandler, Subscription};
