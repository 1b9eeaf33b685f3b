//! Block to wire-frame encoding
//!
//! A frame is the block's samples as raw little-endian f32, concatenated,
//! with no header. Sample rate and block size are agreed out of band.

use crate::audio::{SampleBlock, SourceFormat};

/// Encoded width of one sample
pub const BYTES_PER_SAMPLE: usize = std::mem::size_of::<f32>();

/// Immutable wire encoding of one sample block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Box<[u8]>,
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }
}

/// Stateless encoder bound to the format of an acquired source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    format: SourceFormat,
}

impl FrameEncoder {
    pub fn new(format: SourceFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// Size in bytes of every frame produced for this format
    pub fn frame_len(&self) -> usize {
        self.format.block_size * BYTES_PER_SAMPLE
    }

    /// Encode a block. Sample order and bit patterns are preserved exactly.
    pub fn encode(&self, block: &SampleBlock) -> Frame {
        debug_assert_eq!(block.len(), self.format.block_size);

        let mut bytes = Vec::with_capacity(block.len() * BYTES_PER_SAMPLE);
        for sample in block.samples() {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        Frame {
            bytes: bytes.into_boxed_slice(),
        }
    }
}

/// Inverse of `FrameEncoder::encode`, used to check the wire format
#[cfg(test)]
pub(crate) fn decode(frame: &Frame) -> Vec<f32> {
    frame
        .as_bytes()
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(block_size: usize) -> FrameEncoder {
        FrameEncoder::new(SourceFormat {
            sample_rate: 44100,
            block_size,
        })
    }

    #[test]
    fn test_frame_is_raw_little_endian_f32() {
        let frame = encoder(2).encode(&SampleBlock::new(vec![1.0, -0.5]));

        assert_eq!(frame.len(), 8);
        assert_eq!(&frame.as_bytes()[..4], &1.0f32.to_le_bytes());
        assert_eq!(&frame.as_bytes()[4..], &(-0.5f32).to_le_bytes());
    }

    #[test]
    fn test_frame_len_matches_block_size() {
        let enc = encoder(1024);
        let frame = enc.encode(&SampleBlock::new(vec![0.0; 1024]));

        assert_eq!(enc.frame_len(), 4096);
        assert_eq!(frame.len(), enc.frame_len());
    }

    #[test]
    fn test_decode_recovers_exact_bits() {
        // Values that would be altered by any clipping, gain, or rounding
        let samples = vec![
            0.0,
            -0.0,
            1.0,
            -1.0,
            1.5,
            -3.25,
            f32::MIN_POSITIVE,
            f32::EPSILON,
            f32::MAX,
            f32::MIN,
            0.123_456_79,
            1.0e-40, // subnormal
        ];
        let block = SampleBlock::new(samples.clone());
        let frame = encoder(samples.len()).encode(&block);
        let decoded = decode(&frame);

        assert_eq!(decoded.len(), samples.len());
        for (orig, back) in samples.iter().zip(decoded.iter()) {
            assert_eq!(orig.to_bits(), back.to_bits());
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let enc = encoder(3);
        let block = SampleBlock::new(vec![0.25, 0.5, 0.75]);
        assert_eq!(enc.encode(&block), enc.encode(&block));
    }
}
