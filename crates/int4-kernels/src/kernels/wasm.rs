//! WASM SIMD kernel: 4-lane f32 registers, BLOCK_N = 16.
//!
//! Only compiled when the build enables `simd128`; wasm has no runtime
//! feature detection. simd128 has no fused multiply-add, so dequant and
//! accumulation are a multiply followed by an add.

use core::arch::wasm32::*;

use int4_core::{Element, Isa, MAX_BLOCK_N};

use super::{is_block_start, RowBuf, ScaleZeroBuf, TileArgs, TileKernel};

const W: usize = 4;
const BLOCK_N: usize = 4 * W;

/// WASM SIMD variant marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct WasmSimdKernel;

impl TileKernel for WasmSimdKernel {
    const ISA: Isa = Isa::WasmSimd;

    unsafe fn launch<T: Element>(args: &TileArgs<'_, T>, mb_size: usize, nb_size: usize) {
        tinygemm_dispatch!(tinygemm, args, mb_size, nb_size, [16]);
    }
}

/// # Safety
/// See [`TileKernel::launch`].
#[target_feature(enable = "simd128")]
unsafe fn tinygemm<T: Element, const BM: usize, const BN: usize>(args: &TileArgs<'_, T>) {
    debug_assert_eq!(BN, BLOCK_N);

    let mut acc = [[f32x4_splat(0.0); 4]; BM];
    let mut scale = [f32x4_splat(0.0); 4];
    let mut zero = [f32x4_splat(0.0); 4];
    let mut sz: ScaleZeroBuf = [0.0; 2 * MAX_BLOCK_N];
    let neg_eight = f32x4_splat(-8.0);
    let mask = u8x16_splat(0x0F);
    let b = args.b.as_ptr();

    for k in 0..args.k {
        if is_block_start(k, args.group_size) {
            args.load_scale_zero(k, &mut sz[..2 * BN]);
            for c in 0..4 {
                let p = sz.as_ptr().add(c * 2 * W);
                let t0 = v128_load(p as *const v128);
                let t1 = v128_load(p.add(W) as *const v128);
                let s = i32x4_shuffle::<0, 2, 4, 6>(t0, t1);
                let z = i32x4_shuffle::<1, 3, 5, 7>(t0, t1);
                scale[c] = s;
                zero[c] = f32x4_add(z, f32x4_mul(s, neg_eight));
            }
        }

        // byte j = col j | col (j + 8) << 4
        let x = v128_load64_zero(b.add(k * args.ldb) as *const u64);
        let lo = u16x8_extend_low_u8x16(v128_and(x, mask));
        let hi = u16x8_extend_low_u8x16(u8x16_shr(x, 4));
        let vi = [
            u32x4_extend_low_u16x8(lo),
            u32x4_extend_high_u16x8(lo),
            u32x4_extend_low_u16x8(hi),
            u32x4_extend_high_u16x8(hi),
        ];
        let mut vb = [f32x4_splat(0.0); 4];
        for c in 0..4 {
            vb[c] = f32x4_add(f32x4_mul(f32x4_convert_u32x4(vi[c]), scale[c]), zero[c]);
        }

        for (m, acc_row) in acc.iter_mut().enumerate() {
            let va = f32x4_splat(args.a.get_unchecked(m * args.lda + k).to_f32());
            for c in 0..4 {
                acc_row[c] = f32x4_add(acc_row[c], f32x4_mul(va, vb[c]));
            }
        }
    }

    let mut out: RowBuf = [0.0; MAX_BLOCK_N];
    for (m, acc_row) in acc.iter().enumerate() {
        for c in 0..4 {
            v128_store(out.as_mut_ptr().add(c * W) as *mut v128, acc_row[c]);
        }
        args.store_row(m, &mut out[..BN]);
    }
}
