//! Portable kernel.
//!
//! Emulates 8-lane registers, so BLOCK_N is 32 and only the 16/32 column
//! shapes exist. Every block uses adjacent nibble pairing and decodes
//! through the 16-entry table.

use int4_core::layout::NIBBLE_LUT;
use int4_core::{Element, Isa};

use super::{is_block_start, ScaleZeroBuf, TileArgs, TileKernel};

/// Scalar variant marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarKernel;

impl TileKernel for ScalarKernel {
    const ISA: Isa = Isa::Scalar;

    unsafe fn launch<T: Element>(args: &TileArgs<'_, T>, mb_size: usize, nb_size: usize) {
        tinygemm_dispatch!(tinygemm, args, mb_size, nb_size, [16, 32]);
    }
}

/// # Safety
/// See [`TileKernel::launch`].
unsafe fn tinygemm<T: Element, const BM: usize, const BN: usize>(args: &TileArgs<'_, T>) {
    let mut acc = [[0.0f32; BN]; BM];
    let mut scale = [0.0f32; BN];
    let mut zero = [0.0f32; BN];
    let mut sz: ScaleZeroBuf = [0.0; 2 * int4_core::MAX_BLOCK_N];
    let mut w = [0.0f32; BN];

    for k in 0..args.k {
        if is_block_start(k, args.group_size) {
            args.load_scale_zero(k, &mut sz[..2 * BN]);
            for n in 0..BN {
                scale[n] = sz[2 * n];
                zero[n] = sz[2 * n + 1];
            }
        }

        let row = &args.b[k * args.ldb..k * args.ldb + BN / 2];
        for n in 0..BN {
            let byte = row[n / 2];
            let nibble = if n % 2 == 0 { byte & 0x0F } else { byte >> 4 };
            w[n] = NIBBLE_LUT[nibble as usize] * scale[n] + zero[n];
        }

        for (m, acc_row) in acc.iter_mut().enumerate() {
            let a = args.a[m * args.lda + k].to_f32();
            for (c, wv) in acc_row.iter_mut().zip(&w) {
                *c += a * wv;
            }
        }
    }

    for (m, acc_row) in acc.iter_mut().enumerate() {
        args.store_row(m, acc_row);
    }
}
