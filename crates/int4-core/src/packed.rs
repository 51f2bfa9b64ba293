//! Packed int4 weight buffer.
//!
//! N-block `i` starts at byte `i * K * BLOCK_N / 2` and is `K * nb / 2`
//! bytes long, where `nb` is `BLOCK_N` except for a possible short last
//! block. The layout is fully determined by (N, K, ISA), so a buffer is only
//! meaningful together with the variant it was packed for.

use std::ops::Range;

use crate::aligned::AlignedBytes;
use crate::error::{Int4Error, Result};
use crate::isa::Isa;
use crate::layout::{check_pack_dims, unpack_block};

/// Packed N x K int4 weights in the tiled layout of one kernel variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedWeights {
    data: AlignedBytes,
    n: usize,
    k: usize,
    isa: Isa,
}

impl PackedWeights {
    /// A zero-filled buffer ready for the packer.
    pub fn zeroed(n: usize, k: usize, isa: Isa) -> Result<Self> {
        check_pack_dims(n, k)?;
        Ok(Self {
            data: AlignedBytes::new_zeroed(n * k / 2),
            n,
            k,
            isa,
        })
    }

    /// Adopt bytes produced earlier by the packer for `isa`.
    pub fn from_raw(bytes: &[u8], n: usize, k: usize, isa: Isa) -> Result<Self> {
        check_pack_dims(n, k)?;
        if bytes.len() != n * k / 2 {
            return Err(Int4Error::ShapeMismatch {
                what: "packed weights",
                expected: n * k / 2,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            data: AlignedBytes::from_slice(bytes),
            n,
            k,
            isa,
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn isa(&self) -> Isa {
        self.isa
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Number of N-blocks.
    pub fn num_blocks(&self) -> usize {
        self.n.div_ceil(self.isa.block_n())
    }

    /// Columns in block `block`.
    pub fn block_cols(&self, block: usize) -> usize {
        assert!(block < self.num_blocks(), "block {} out of range", block);
        let block_n = self.isa.block_n();
        block_n.min(self.n - block * block_n)
    }

    /// Byte range of block `block`.
    pub fn block_range(&self, block: usize) -> Range<usize> {
        let start = block * self.k * self.isa.block_n() / 2;
        start..start + self.k * self.block_cols(block) / 2
    }

    /// Decode back to the logical N x K weights in [-8, 7].
    pub fn unpack(&self) -> Vec<i32> {
        let mut weight = vec![0i32; self.n * self.k];
        let block_n = self.isa.block_n();
        for block in 0..self.num_blocks() {
            let nb = self.block_cols(block);
            let n_start = block * block_n;
            unpack_block(
                &self.data[self.block_range(block)],
                self.k,
                nb,
                self.isa.pairing(nb),
                &mut weight[n_start * self.k..(n_start + nb) * self.k],
            );
        }
        weight
    }
}
