//! Per-block processing: encode, then gate
//!
//! ```text
//! SampleBlock ──▶ FrameEncoder ──▶ MuteGate ──▶ Transport
//! ```

mod encoder;
mod gate;

pub use encoder::{Frame, FrameEncoder, BYTES_PER_SAMPLE};
pub use gate::MuteGate;

#[cfg(test)]
pub(crate) use encoder::decode;
