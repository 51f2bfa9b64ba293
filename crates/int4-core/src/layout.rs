//! Nibble encoding and the per-block packed weight layout.
//!
//! Weights are stored as offset-binary nibbles: `value + 8`, so the
//! logical range [-8, 7] maps to 0..=15. An N-block of `nb` columns is
//! stored k-major: row `k` of the block is `nb / 2` bytes, and byte `j`
//! holds the two columns selected by the block's [`NibblePairing`].
//!
//! ```text
//! Strided  (nb = 32):  byte j = col j        | col (j + 16) << 4
//! Adjacent (nb = 32):  byte j = col (2j)     | col (2j + 1) << 4
//! ```

use crate::error::{Int4Error, Result};
use crate::isa::NB_GRANULE;

/// Dequantization table: nibble `u` decodes to `u - 8`.
pub const NIBBLE_LUT: [f32; 16] = [
    -8.0, -7.0, -6.0, -5.0, -4.0, -3.0, -2.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0,
];

/// Which two columns of a block share a packed byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NibblePairing {
    /// Column `j` with column `j + nb/2`.
    Strided,
    /// Column `2j` with column `2j + 1`.
    Adjacent,
}

impl NibblePairing {
    /// (low nibble column, high nibble column) stored in byte `j` of an
    /// `nb`-wide block row.
    #[inline]
    pub fn columns(self, j: usize, nb: usize) -> (usize, usize) {
        match self {
            NibblePairing::Strided => (j, j + nb / 2),
            NibblePairing::Adjacent => (2 * j, 2 * j + 1),
        }
    }
}

/// Encode a weight as an offset-binary nibble. Values outside [-8, 7] are
/// truncated to their low 4 bits, not rejected.
#[inline]
pub fn encode_nibble(v: i32) -> u8 {
    (v.wrapping_add(8) as u8) & 0x0F
}

/// Decode the low nibble of `n` back to [-8, 7].
#[inline]
pub fn decode_nibble(n: u8) -> i32 {
    (n & 0x0F) as i32 - 8
}

/// Check (N, K) against the packed layout constraints.
pub fn check_pack_dims(n: usize, k: usize) -> Result<()> {
    if n == 0 || k == 0 {
        return Err(Int4Error::InvalidDimension(format!(
            "N and K must be positive, got N={}, K={}",
            n, k
        )));
    }
    if !n.is_multiple_of(NB_GRANULE) {
        return Err(Int4Error::InvalidDimension(format!(
            "N={} must be a multiple of {}",
            n, NB_GRANULE
        )));
    }
    if !k.is_multiple_of(2) {
        return Err(Int4Error::InvalidDimension(format!("K={} must be even", k)));
    }
    Ok(())
}

/// Pack one N-block.
///
/// `weight` holds the block's `nb` weight rows (row-major, `k` values each)
/// and `dst` receives `k * nb / 2` bytes.
pub fn pack_block(weight: &[i32], k: usize, nb: usize, pairing: NibblePairing, dst: &mut [u8]) {
    assert_eq!(weight.len(), nb * k, "pack_block: weight length mismatch");
    assert_eq!(dst.len(), k * nb / 2, "pack_block: destination length mismatch");

    let half = nb / 2;
    for (kk, row) in dst.chunks_exact_mut(half).enumerate() {
        for (j, byte) in row.iter_mut().enumerate() {
            let (lo, hi) = pairing.columns(j, nb);
            *byte = encode_nibble(weight[lo * k + kk]) | (encode_nibble(weight[hi * k + kk]) << 4);
        }
    }
}

/// Inverse of [`pack_block`]: decode `k * nb / 2` bytes into `nb` rows of
/// `k` weights.
pub fn unpack_block(src: &[u8], k: usize, nb: usize, pairing: NibblePairing, weight: &mut [i32]) {
    assert_eq!(src.len(), k * nb / 2, "unpack_block: source length mismatch");
    assert_eq!(weight.len(), nb * k, "unpack_block: weight length mismatch");

    let half = nb / 2;
    for (kk, row) in src.chunks_exact(half).enumerate() {
        for (j, &byte) in row.iter().enumerate() {
            let (lo, hi) = pairing.columns(j, nb);
            weight[lo * k + kk] = decode_nibble(byte);
            weight[hi * k + kk] = decode_nibble(byte >> 4);
        }
    }
}
