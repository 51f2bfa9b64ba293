//! NEON kernel: 4-lane f32 registers, BLOCK_N = 16.
//!
//! A block row is 8 bytes; byte j carries column j (low) and column j + 8
//! (high). The -8 offset is folded into the zero point per group.

use std::arch::aarch64::*;

use int4_core::{Element, Isa, MAX_BLOCK_N};

use super::{is_block_start, RowBuf, ScaleZeroBuf, TileArgs, TileKernel};

const W: usize = 4;
const BLOCK_N: usize = 4 * W;

/// NEON variant marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeonKernel;

impl TileKernel for NeonKernel {
    const ISA: Isa = Isa::Neon;

    unsafe fn launch<T: Element>(args: &TileArgs<'_, T>, mb_size: usize, nb_size: usize) {
        tinygemm_dispatch!(tinygemm, args, mb_size, nb_size, [16]);
    }
}

/// # Safety
/// See [`TileKernel::launch`]; additionally requires NEON.
#[target_feature(enable = "neon")]
unsafe fn tinygemm<T: Element, const BM: usize, const BN: usize>(args: &TileArgs<'_, T>) {
    debug_assert_eq!(BN, BLOCK_N);

    let mut acc = [[vdupq_n_f32(0.0); 4]; BM];
    let mut scale = [vdupq_n_f32(0.0); 4];
    let mut zero = [vdupq_n_f32(0.0); 4];
    let mut sz: ScaleZeroBuf = [0.0; 2 * MAX_BLOCK_N];
    let neg_eight = vdupq_n_f32(-8.0);
    let mask = vdup_n_u8(0x0F);
    let b = args.b.as_ptr();

    for k in 0..args.k {
        if is_block_start(k, args.group_size) {
            args.load_scale_zero(k, &mut sz[..2 * BN]);
            for c in 0..4 {
                let pair = vld2q_f32(sz.as_ptr().add(c * 2 * W));
                scale[c] = pair.0;
                zero[c] = vfmaq_f32(pair.1, pair.0, neg_eight);
            }
        }

        let x = vld1_u8(b.add(k * args.ldb));
        let lo = vmovl_u8(vand_u8(x, mask));
        let hi = vmovl_u8(vshr_n_u8::<4>(x));
        let vi = [
            vmovl_u16(vget_low_u16(lo)),
            vmovl_u16(vget_high_u16(lo)),
            vmovl_u16(vget_low_u16(hi)),
            vmovl_u16(vget_high_u16(hi)),
        ];
        let mut vb = [vdupq_n_f32(0.0); 4];
        for c in 0..4 {
            vb[c] = vfmaq_f32(zero[c], vcvtq_f32_u32(vi[c]), scale[c]);
        }

        for (m, acc_row) in acc.iter_mut().enumerate() {
            let va = vdupq_n_f32(args.a.get_unchecked(m * args.lda + k).to_f32());
            for c in 0..4 {
                acc_row[c] = vfmaq_f32(acc_row[c], va, vb[c]);
            }
        }
    }

    let mut out: RowBuf = [0.0; MAX_BLOCK_N];
    for (m, acc_row) in acc.iter().enumerate() {
        for c in 0..4 {
            vst1q_f32(out.as_mut_ptr().add(c * W), acc_row[c]);
        }
        args.store_row(m, &mut out[..BN]);
    }
}
