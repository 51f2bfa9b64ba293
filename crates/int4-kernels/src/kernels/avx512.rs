//! AVX-512 kernel: 16-lane f32 registers, BLOCK_N = 64.
//!
//! Nibbles are decoded with a register-resident 16-entry table through
//! `vpermps`, which only reads the low 4 bits of each index. A full block
//! row is 32 bytes: bytes 0..16 carry columns 0..16 (low) and 32..48
//! (high), bytes 16..32 carry columns 16..32 and 48..64.

use std::arch::x86_64::*;

use int4_core::{Element, Isa, MAX_BLOCK_N};

use super::avx2::conver_int4_to_int8;
use super::{is_block_start, RowBuf, ScaleZeroBuf, TileArgs, TileKernel};

const W: usize = 16;
const BLOCK_N: usize = 4 * W;

/// Rows of B ahead of the current k to prefetch.
const PREFETCH_K: usize = 64;

/// AVX-512 variant marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Avx512Kernel;

impl TileKernel for Avx512Kernel {
    const ISA: Isa = Isa::Avx512;

    unsafe fn launch<T: Element>(args: &TileArgs<'_, T>, mb_size: usize, nb_size: usize) {
        tinygemm_dispatch!(tinygemm, args, mb_size, nb_size, [16, 32, 48, 64]);
    }
}

/// De-interleave 16 (scale, zero) pairs at `src`.
#[target_feature(enable = "avx512f")]
#[inline]
unsafe fn load_scale_zero_pairs(src: *const f32) -> (__m512, __m512) {
    let evens = _mm512_setr_epi32(0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30);
    let odds = _mm512_setr_epi32(1, 3, 5, 7, 9, 11, 13, 15, 17, 19, 21, 23, 25, 27, 29, 31);
    let t0 = _mm512_loadu_ps(src);
    let t1 = _mm512_loadu_ps(src.add(W));
    (
        _mm512_permutex2var_ps(t0, evens, t1),
        _mm512_permutex2var_ps(t0, odds, t1),
    )
}

/// # Safety
/// See [`TileKernel::launch`]; additionally requires AVX-512F, AVX2 and FMA.
#[target_feature(enable = "avx512f,avx2,fma")]
unsafe fn tinygemm<T: Element, const BM: usize, const BN: usize>(args: &TileArgs<'_, T>) {
    let cols = BN / W;
    let full = BN == BLOCK_N;

    let lut = _mm512_setr_ps(
        -8.0, -7.0, -6.0, -5.0, -4.0, -3.0, -2.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0,
    );
    let mut acc = [[_mm512_setzero_ps(); 4]; BM];
    let mut scale = [_mm512_setzero_ps(); 4];
    let mut zero = [_mm512_setzero_ps(); 4];
    let mut sz: ScaleZeroBuf = [0.0; 2 * MAX_BLOCK_N];
    let b = args.b.as_ptr();

    for k in 0..args.k {
        if is_block_start(k, args.group_size) {
            args.load_scale_zero(k, &mut sz[..2 * BN]);
            for c in 0..cols {
                let (s, z) = load_scale_zero_pairs(sz.as_ptr().add(c * 2 * W));
                scale[c] = s;
                zero[c] = z;
            }
        }

        let row = b.add(k * args.ldb);
        let mut vb = [_mm512_setzero_ps(); 4];
        if full {
            _mm_prefetch::<_MM_HINT_T0>(row.wrapping_add(PREFETCH_K * args.ldb) as *const i8);
            let i0 = _mm512_cvtepu8_epi32(_mm_loadu_si128(row as *const __m128i));
            let i1 = _mm512_cvtepu8_epi32(_mm_loadu_si128(row.add(16) as *const __m128i));
            vb[0] = _mm512_permutexvar_ps(i0, lut);
            vb[1] = _mm512_permutexvar_ps(i1, lut);
            vb[2] = _mm512_permutexvar_ps(_mm512_srli_epi32::<4>(i0), lut);
            vb[3] = _mm512_permutexvar_ps(_mm512_srli_epi32::<4>(i1), lut);
        } else {
            // adjacent pairs: 8 bytes per 16-column vector
            for (c, v) in vb.iter_mut().enumerate().take(cols) {
                let x = conver_int4_to_int8(row.add(c * 8));
                *v = _mm512_permutexvar_ps(_mm512_cvtepu8_epi32(x), lut);
            }
        }
        for c in 0..cols {
            vb[c] = _mm512_fmadd_ps(vb[c], scale[c], zero[c]);
        }

        for (m, acc_row) in acc.iter_mut().enumerate() {
            let va = _mm512_set1_ps(args.a.get_unchecked(m * args.lda + k).to_f32());
            for c in 0..cols {
                acc_row[c] = _mm512_fmadd_ps(va, vb[c], acc_row[c]);
            }
        }
    }

    let mut out: RowBuf = [0.0; MAX_BLOCK_N];
    for (m, acc_row) in acc.iter().enumerate() {
        for c in 0..cols {
            _mm512_storeu_ps(out.as_mut_ptr().add(c * W), acc_row[c]);
        }
        args.store_row(m, &mut out[..BN]);
    }
}
