//! Tiled dequant-GEMM kernels (`tinygemm`), one module per variant.
//!
//! Every variant computes one `BM` x `BN` output tile:
//!
//! ```text
//! acc[BM][BN] = 0                                  (f32)
//! for k in 0..K:
//!     if k % group_size == 0: reload + de-interleave (scale, zero) for BN columns
//!     w[BN]  = unpack(B[k]) * scale + zero         (one FMA per column vector)
//!     acc[m] += broadcast(A[m, k]) * w             (one FMA per column vector)
//! clamp (optional), narrow to T once, store
//! ```
//!
//! `BM` and `BN` are const generics. Boundary tiles are served by the
//! smaller specializations of the dispatch table, never by masking.

use int4_core::{Element, Isa, OutputClamp, MAX_BLOCK_N};

/// Expand the (mb, nb) dispatch table of one variant's `tinygemm`.
macro_rules! tinygemm_dispatch {
    (@nb $kernel:ident, $args:expr, $m:literal, $nb:expr, [$($n:literal),+]) => {
        match $nb {
            $($n => $kernel::<_, $m, $n>($args),)+
            other => panic!("Unsupported n block size: {}", other),
        }
    };
    ($kernel:ident, $args:expr, $mb:expr, $nb:expr, [$($n:literal),+ $(,)?]) => {
        match $mb {
            1 => tinygemm_dispatch!(@nb $kernel, $args, 1, $nb, [$($n),+]),
            2 => tinygemm_dispatch!(@nb $kernel, $args, 2, $nb, [$($n),+]),
            3 => tinygemm_dispatch!(@nb $kernel, $args, 3, $nb, [$($n),+]),
            4 => tinygemm_dispatch!(@nb $kernel, $args, 4, $nb, [$($n),+]),
            other => panic!("Unsupported m block size: {}", other),
        }
    };
}

pub mod scalar;

#[cfg(target_arch = "x86_64")]
pub mod avx2;
#[cfg(target_arch = "x86_64")]
pub mod avx512;

#[cfg(target_arch = "aarch64")]
pub mod neon;

#[cfg(all(target_arch = "wasm32", target_feature = "simd128"))]
pub mod wasm;

/// Output tile destination: a raw pointer to the tile's top-left element
/// and the row stride of the full output.
#[derive(Debug)]
pub struct TileOut<T> {
    ptr: *mut T,
    ldc: usize,
}

impl<T> TileOut<T> {
    /// # Safety
    /// For every row `r` the tile is launched with, `ptr + r * ldc` must be
    /// valid for writes of the tile's column count, and no one else may
    /// access that region while the tile runs.
    pub unsafe fn new(ptr: *mut T, ldc: usize) -> Self {
        Self { ptr, ldc }
    }
}

/// Inputs of one tile.
#[derive(Debug)]
pub struct TileArgs<'a, T> {
    /// Activations from the tile's first row; row stride `lda`.
    pub a: &'a [T],
    pub lda: usize,
    /// Packed weights of the tile's N-block; `ldb = nb / 2` bytes per k.
    pub b: &'a [u8],
    pub ldb: usize,
    /// Interleaved (scale, zero) pairs from the tile's first column; group
    /// stride `ld_sz`.
    pub scale_zero: &'a [T],
    pub ld_sz: usize,
    pub k: usize,
    pub group_size: usize,
    pub out: TileOut<T>,
    pub clamp: Option<OutputClamp>,
}

impl<T: Element> TileArgs<'_, T> {
    /// Widen the interleaved (scale, zero) run of the group containing `k`
    /// into `buf` (`2 * nb` values).
    #[inline(always)]
    pub(crate) fn load_scale_zero(&self, k: usize, buf: &mut [f32]) {
        let start = (k / self.group_size) * self.ld_sz;
        T::widen_slice(&self.scale_zero[start..start + buf.len()], buf);
    }

    /// Clamp `values` and narrow them into output row `row`.
    ///
    /// # Safety
    /// `row` and `values.len()` must lie within the tile described by `out`.
    #[inline(always)]
    pub(crate) unsafe fn store_row(&self, row: usize, values: &mut [f32]) {
        if let Some(clamp) = &self.clamp {
            for v in values.iter_mut() {
                *v = clamp.apply(*v);
            }
        }
        let dst = std::slice::from_raw_parts_mut(self.out.ptr.add(row * self.out.ldc), values.len());
        T::narrow_slice(values, dst);
    }
}

/// One kernel variant.
pub trait TileKernel {
    const ISA: Isa;

    /// Run the `mb_size` x `nb_size` specialization on `args`.
    ///
    /// Panics if the variant has no specialization for that shape.
    ///
    /// # Safety
    /// `Self::ISA` must be available on the running CPU, and `args` must
    /// describe an in-bounds tile: `a` holds `mb_size` rows of `k`, `b`
    /// holds `k * nb_size / 2` bytes and `scale_zero` covers every group.
    unsafe fn launch<T: Element>(args: &TileArgs<'_, T>, mb_size: usize, nb_size: usize);
}

/// Scratch row sized for the widest tile.
pub(crate) type RowBuf = [f32; MAX_BLOCK_N];

/// Scratch (scale, zero) run sized for the widest tile.
pub(crate) type ScaleZeroBuf = [f32; 2 * MAX_BLOCK_N];

/// `k` starts a new quantization group. `group_size` is a power of two.
#[inline(always)]
pub(crate) fn is_block_start(k: usize, group_size: usize) -> bool {
    k & (group_size - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::scalar::ScalarKernel;

    #[test]
    fn test_block_start() {
        assert!(is_block_start(0, 32));
        assert!(is_block_start(64, 32));
        assert!(!is_block_start(33, 32));
        assert!(!is_block_start(128, 256));
    }

    fn launch_scalar(mb: usize, nb: usize) {
        let k = 32;
        let a = vec![0.0f32; 8 * k];
        let b = vec![0u8; k * 64 / 2];
        let sz = vec![0.0f32; 2 * 64];
        let mut c = vec![0.0f32; 8 * 64];
        let args = TileArgs {
            a: &a,
            lda: k,
            b: &b,
            ldb: nb / 2,
            scale_zero: &sz,
            ld_sz: 2 * 64,
            k,
            group_size: 32,
            // SAFETY: c covers any tile the table accepts.
            out: unsafe { TileOut::new(c.as_mut_ptr(), 64) },
            clamp: None,
        };
        // SAFETY: scalar runs everywhere; buffers are large enough.
        unsafe { ScalarKernel::launch(&args, mb, nb) };
    }

    #[test]
    fn test_supported_shapes_run() {
        for mb in 1..=4 {
            for nb in [16, 32] {
                launch_scalar(mb, nb);
            }
        }
    }

    #[test]
    #[should_panic(expected = "Unsupported m block size: 5")]
    fn test_unsupported_m_block_panics() {
        launch_scalar(5, 32);
    }

    #[test]
    #[should_panic(expected = "Unsupported n block size: 48")]
    fn test_unsupported_n_block_panics() {
        launch_scalar(2, 48);
    }

    #[test]
    fn test_store_row_clamps_before_narrowing() {
        let mut c = vec![half::bf16::ZERO; 16];
        let args: TileArgs<'_, half::bf16> = TileArgs {
            a: &[],
            lda: 0,
            b: &[],
            ldb: 0,
            scale_zero: &[],
            ld_sz: 0,
            k: 0,
            group_size: 32,
            // SAFETY: one 16-wide row.
            out: unsafe { TileOut::new(c.as_mut_ptr(), 16) },
            clamp: Some(OutputClamp::relu()),
        };
        let mut row = [-1.5f32; 16];
        row[3] = 2.5;
        // SAFETY: row 0, 16 columns, inside c.
        unsafe { args.store_row(0, &mut row) };
        assert_eq!(c[0].to_f32(), 0.0);
        assert_eq!(c[3].to_f32(), 2.5);
    }
}
