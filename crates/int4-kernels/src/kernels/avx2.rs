//! AVX2 + FMA kernel: 8-lane f32 registers, BLOCK_N = 32.
//!
//! Unpack is mask/shift + convert, so nibbles come out as 0..=15 and the
//! -8 offset is folded into the zero point once per group:
//! `zero' = zero - 8 * scale`, `w = u * scale + zero'`.

use std::arch::x86_64::*;

use int4_core::{Element, Isa, MAX_BLOCK_N};

use super::{is_block_start, RowBuf, ScaleZeroBuf, TileArgs, TileKernel};

const W: usize = 8;
const BLOCK_N: usize = 4 * W;

/// AVX2 variant marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Avx2Kernel;

impl TileKernel for Avx2Kernel {
    const ISA: Isa = Isa::Avx2;

    unsafe fn launch<T: Element>(args: &TileArgs<'_, T>, mb_size: usize, nb_size: usize) {
        tinygemm_dispatch!(tinygemm, args, mb_size, nb_size, [16, 32]);
    }
}

/// Expand 8 packed bytes (16 adjacent-pair nibbles) into 16 bytes, one
/// nibble per byte, in column order.
#[target_feature(enable = "avx2")]
#[inline]
pub(super) unsafe fn conver_int4_to_int8(src: *const u8) -> __m128i {
    let packed = _mm_loadl_epi64(src as *const __m128i);
    // each u16 lane holds one source byte: 0x00hl
    let wide = _mm_cvtepu8_epi16(packed);
    let low = _mm_and_si128(wide, _mm_set1_epi16(0x000F));
    let high = _mm_slli_epi16::<4>(_mm_and_si128(wide, _mm_set1_epi16(0x00F0)));
    // 0x0h0l -> bytes [l, h]
    _mm_or_si128(low, high)
}

/// De-interleave 8 (scale, zero) pairs at `src`.
#[target_feature(enable = "avx2")]
#[inline]
unsafe fn load_scale_zero_pairs(src: *const f32) -> (__m256, __m256) {
    let idx = _mm256_setr_epi32(0, 2, 4, 6, 1, 3, 5, 7);
    // s0 s1 s2 s3 z0 z1 z2 z3 | s4 s5 s6 s7 z4 z5 z6 z7
    let lo = _mm256_permutevar8x32_ps(_mm256_loadu_ps(src), idx);
    let hi = _mm256_permutevar8x32_ps(_mm256_loadu_ps(src.add(W)), idx);
    (
        _mm256_permute2f128_ps::<0x20>(lo, hi),
        _mm256_permute2f128_ps::<0x31>(lo, hi),
    )
}

/// # Safety
/// See [`TileKernel::launch`]; additionally requires AVX2 and FMA.
#[target_feature(enable = "avx2,fma")]
unsafe fn tinygemm<T: Element, const BM: usize, const BN: usize>(args: &TileArgs<'_, T>) {
    let cols = BN / W;
    let full = BN == BLOCK_N;

    let mut acc = [[_mm256_setzero_ps(); 4]; BM];
    let mut scale = [_mm256_setzero_ps(); 4];
    let mut zero = [_mm256_setzero_ps(); 4];
    let mut sz: ScaleZeroBuf = [0.0; 2 * MAX_BLOCK_N];
    let neg_eight = _mm256_set1_ps(-8.0);
    let mask = _mm256_set1_epi32(0x0F);
    let b = args.b.as_ptr();

    for k in 0..args.k {
        if is_block_start(k, args.group_size) {
            args.load_scale_zero(k, &mut sz[..2 * BN]);
            for c in 0..cols {
                let (s, z) = load_scale_zero_pairs(sz.as_ptr().add(c * 2 * W));
                scale[c] = s;
                zero[c] = _mm256_fmadd_ps(s, neg_eight, z);
            }
        }

        let row = b.add(k * args.ldb);
        let mut vi = [_mm256_setzero_si256(); 4];
        if full {
            // byte j = col j | col (j + 16) << 4
            let x = _mm_loadu_si128(row as *const __m128i);
            let lo = _mm256_cvtepu8_epi32(x);
            let hi = _mm256_cvtepu8_epi32(_mm_srli_si128::<8>(x));
            vi[0] = _mm256_and_si256(lo, mask);
            vi[1] = _mm256_and_si256(hi, mask);
            vi[2] = _mm256_srli_epi32::<4>(lo);
            vi[3] = _mm256_srli_epi32::<4>(hi);
        } else {
            for p in 0..cols / 2 {
                let x = conver_int4_to_int8(row.add(p * W));
                vi[2 * p] = _mm256_cvtepu8_epi32(x);
                vi[2 * p + 1] = _mm256_cvtepu8_epi32(_mm_srli_si128::<8>(x));
            }
        }

        let mut vb = [_mm256_setzero_ps(); 4];
        for c in 0..cols {
            vb[c] = _mm256_fmadd_ps(_mm256_cvtepi32_ps(vi[c]), scale[c], zero[c]);
        }

        for (m, acc_row) in acc.iter_mut().enumerate() {
            let va = _mm256_set1_ps(args.a.get_unchecked(m * args.lda + k).to_f32());
            for c in 0..cols {
                acc_row[c] = _mm256_fmadd_ps(va, vb[c], acc_row[c]);
            }
        }
    }

    let mut out: RowBuf = [0.0; MAX_BLOCK_N];
    for (m, acc_row) in acc.iter().enumerate() {
        for c in 0..cols {
            _mm256_storeu_ps(out.as_mut_ptr().add(c * W), acc_row[c]);
        }
        args.store_row(m, &mut out[..BN]);
    }
}
