//! Fixed-size sample blocks
//!
//! Device callbacks deliver however many samples the platform feels like.
//! `BlockAssembler` re-chunks them into blocks of exactly `block_size` mono
//! samples, which is the unit the rest of the pipeline works in.

/// Samples per block when nothing else is configured
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Largest accepted block (about 1.4 s at 48 kHz)
pub const MAX_BLOCK_SIZE: usize = 65536;

/// One fixed-length batch of mono f32 samples (nominally in [-1.0, 1.0])
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    samples: Vec<f32>,
}

impl SampleBlock {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Accumulates callback-sized sample runs and emits full blocks in order.
///
/// Leftover samples stay pending until enough arrive to fill the next block.
/// A partial block is never emitted.
#[derive(Debug)]
pub struct BlockAssembler {
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockAssembler {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Feed samples, calling `emit` once per completed block
    pub fn push<I>(&mut self, samples: I, mut emit: impl FnMut(SampleBlock))
    where
        I: IntoIterator<Item = f32>,
    {
        for sample in samples {
            self.pending.push(sample);
            if self.pending.len() == self.block_size {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
                emit(SampleBlock::new(full));
            }
        }
    }

    /// Samples waiting for the next block
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emits_only_full_blocks() {
        let mut assembler = BlockAssembler::new(4);
        let mut blocks = Vec::new();

        assembler.push([0.1, 0.2, 0.3], |b| blocks.push(b));
        assert!(blocks.is_empty());
        assert_eq!(assembler.pending(), 3);

        assembler.push([0.4, 0.5], |b| blocks.push(b));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].samples(), &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(assembler.pending(), 1);
    }

    #[test]
    fn test_large_callback_splits_into_ordered_blocks() {
        let mut assembler = BlockAssembler::new(3);
        let mut blocks = Vec::new();

        let input: Vec<f32> = (0..10).map(|i| i as f32).collect();
        assembler.push(input, |b| blocks.push(b));

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].samples(), &[0.0, 1.0, 2.0]);
        assert_eq!(blocks[1].samples(), &[3.0, 4.0, 5.0]);
        assert_eq!(blocks[2].samples(), &[6.0, 7.0, 8.0]);
        assert_eq!(assembler.pending(), 1);
    }

    #[test]
    fn test_zero_block_size_is_clamped() {
        let assembler = BlockAssembler::new(0);
        assert_eq!(assembler.block_size(), 1);
    }

    #[test]
    fn test_clear_discards_partial_block() {
        let mut assembler = BlockAssembler::new(DEFAULT_BLOCK_SIZE);
        assembler.push(vec![0.0; 100], |_| panic!("no block expected"));
        assembler.clear();
        assert_eq!(assembler.pending(), 0);
    }
}
