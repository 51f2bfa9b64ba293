//! Tile scheduler: `C = A x dequant(W)^T`.
//!
//! The MB x NB output tile grid is flattened to one index range and handed
//! to a [`ParallelExecutor`] with default chunking. Each worker converts the
//! first flat index of its chunk to (mb, nb) once and then steps through the
//! grid row-major, launching the kernel specialization for each tile's
//! clipped shape. Tiles write disjoint output regions and read shared
//! immutable inputs, so no synchronization is needed beyond the fork-join.

use std::borrow::Cow;
use std::ops::Range;

use int4_core::{
    DType, Element, Int4Error, Isa, KernelConfig, OutputClamp, PackedWeights, Result,
    ScaleZeroTable, BLOCK_M, SUPPORTED_GROUP_SIZES,
};

use crate::kernels::scalar::ScalarKernel;
use crate::kernels::{TileArgs, TileKernel, TileOut};
use crate::parallel::{ParallelExecutor, RayonExecutor, SharedMut};
use crate::tile::TileGrid;

#[cfg(target_arch = "x86_64")]
use crate::kernels::{avx2::Avx2Kernel, avx512::Avx512Kernel};

#[cfg(target_arch = "aarch64")]
use crate::kernels::neon::NeonKernel;

#[cfg(all(target_arch = "wasm32", target_feature = "simd128"))]
use crate::kernels::wasm::WasmSimdKernel;

/// Inputs of one matmul call.
#[derive(Debug, Clone, Copy)]
pub struct MatmulArgs<'a, T> {
    /// M x K activations, row-major.
    pub a: &'a [T],
    pub m: usize,
    pub packed: &'a PackedWeights,
    pub group_size: usize,
    pub scale_zero: &'a ScaleZeroTable<T>,
}

/// `C[M, N]` from M x K activations and packed N x K int4 weights, with the
/// default configuration on the global rayon pool.
pub fn int4pack_mm<T: Element>(
    a: &[T],
    m: usize,
    packed: &PackedWeights,
    group_size: usize,
    scale_zero: &ScaleZeroTable<T>,
) -> Result<Vec<T>> {
    let mut c = vec![T::default(); m * packed.n()];
    int4pack_mm_into(a, m, packed, group_size, scale_zero, &mut c)?;
    Ok(c)
}

/// As [`int4pack_mm`], writing into a caller-owned M x N buffer.
pub fn int4pack_mm_into<T: Element>(
    a: &[T],
    m: usize,
    packed: &PackedWeights,
    group_size: usize,
    scale_zero: &ScaleZeroTable<T>,
    c: &mut [T],
) -> Result<()> {
    let args = MatmulArgs {
        a,
        m,
        packed,
        group_size,
        scale_zero,
    };
    int4pack_mm_with(&KernelConfig::default(), &RayonExecutor::global(), args, c)
}

/// Full matmul driven by `config` alone, on an executor sized by
/// `config.num_threads`.
pub fn int4pack_mm_config<T: Element>(
    config: &KernelConfig,
    args: MatmulArgs<'_, T>,
    c: &mut [T],
) -> Result<()> {
    config.validate()?;
    let executor = RayonExecutor::from_config(config)?;
    int4pack_mm_with(config, &executor, args, c)
}

/// Full matmul with an explicit configuration and executor.
pub fn int4pack_mm_with<T: Element, E: ParallelExecutor>(
    config: &KernelConfig,
    executor: &E,
    args: MatmulArgs<'_, T>,
    c: &mut [T],
) -> Result<()> {
    let num_tiles = validate(config, &args, c.len())?;
    run(config, executor, args, 0..num_tiles, c)
}

/// Compute only the output tiles whose flat indices fall in `tiles`.
///
/// Elements outside those tiles are left untouched, so disjoint ranges
/// written into the same buffer compose into the full result.
pub fn int4pack_mm_tiles<T: Element, E: ParallelExecutor>(
    config: &KernelConfig,
    executor: &E,
    args: MatmulArgs<'_, T>,
    tiles: Range<usize>,
    c: &mut [T],
) -> Result<()> {
    let num_tiles = validate(config, &args, c.len())?;
    if tiles.start > tiles.end || tiles.end > num_tiles {
        return Err(Int4Error::InvalidDimension(format!(
            "tile range {:?} outside 0..{}",
            tiles, num_tiles
        )));
    }
    run(config, executor, args, tiles, c)
}

/// Number of output tiles for `m` rows of `packed`.
pub fn num_tiles(m: usize, packed: &PackedWeights) -> usize {
    TileGrid::new(m, packed.n(), BLOCK_M, packed.isa().block_n()).num_tiles()
}

fn validate<T: Element>(config: &KernelConfig, args: &MatmulArgs<'_, T>, c_len: usize) -> Result<usize> {
    config.validate()?;

    let packed = args.packed;
    let (m, n, k, gs) = (args.m, packed.n(), packed.k(), args.group_size);

    if !SUPPORTED_GROUP_SIZES.contains(&gs) {
        return Err(Int4Error::UnsupportedGroupSize { group_size: gs });
    }
    if !k.is_multiple_of(gs) {
        return Err(Int4Error::InvalidDimension(format!(
            "group size {} does not divide K={}",
            gs, k
        )));
    }
    if args.a.len() != m * k {
        return Err(Int4Error::ShapeMismatch {
            what: "activation",
            expected: m * k,
            actual: args.a.len(),
        });
    }
    if args.scale_zero.groups() != k / gs {
        return Err(Int4Error::ShapeMismatch {
            what: "scale/zero groups",
            expected: k / gs,
            actual: args.scale_zero.groups(),
        });
    }
    if args.scale_zero.n() != n {
        return Err(Int4Error::ShapeMismatch {
            what: "scale/zero columns",
            expected: n,
            actual: args.scale_zero.n(),
        });
    }
    if c_len != m * n {
        return Err(Int4Error::ShapeMismatch {
            what: "output",
            expected: m * n,
            actual: c_len,
        });
    }

    let isa = packed.isa();
    if let Some(pinned) = config.isa.pinned() {
        if pinned != isa {
            return Err(Int4Error::IsaMismatch {
                packed: isa.name(),
                requested: pinned.name(),
            });
        }
    }
    if !isa.is_available() {
        return Err(Int4Error::IsaUnavailable(isa.name()));
    }

    Ok(num_tiles(m, packed))
}

fn run<T: Element, E: ParallelExecutor>(
    config: &KernelConfig,
    executor: &E,
    args: MatmulArgs<'_, T>,
    tiles: Range<usize>,
    c: &mut [T],
) -> Result<()> {
    if tiles.is_empty() {
        return Ok(());
    }

    let mode = config.fpmath_mode;
    let a: Cow<'_, [T]> = if T::DTYPE == DType::F32 && !mode.is_strict() {
        Cow::Owned(args.a.iter().map(|&x| T::from_f32(mode.round(x.to_f32()))).collect())
    } else {
        Cow::Borrowed(args.a)
    };

    let isa = args.packed.isa();
    log::debug!(
        "int4pack_mm: M={} N={} K={} gs={} dtype={} isa={} tiles={:?}",
        args.m,
        args.packed.n(),
        args.packed.k(),
        args.group_size,
        T::DTYPE,
        isa,
        tiles
    );

    let plan = Plan {
        a: a.as_ref(),
        args,
        clamp: config.clamp,
    };
    match isa {
        Isa::Scalar => schedule::<T, ScalarKernel, E>(executor, &plan, tiles, c),
        #[cfg(target_arch = "x86_64")]
        Isa::Avx2 => schedule::<T, Avx2Kernel, E>(executor, &plan, tiles, c),
        #[cfg(target_arch = "x86_64")]
        Isa::Avx512 => schedule::<T, Avx512Kernel, E>(executor, &plan, tiles, c),
        #[cfg(target_arch = "aarch64")]
        Isa::Neon => schedule::<T, NeonKernel, E>(executor, &plan, tiles, c),
        #[cfg(all(target_arch = "wasm32", target_feature = "simd128"))]
        Isa::WasmSimd => schedule::<T, WasmSimdKernel, E>(executor, &plan, tiles, c),
        #[allow(unreachable_patterns)]
        other => return Err(Int4Error::IsaUnavailable(other.name())),
    }
    Ok(())
}

struct Plan<'a, T> {
    a: &'a [T],
    args: MatmulArgs<'a, T>,
    clamp: Option<OutputClamp>,
}

fn schedule<T: Element, K: TileKernel, E: ParallelExecutor>(
    executor: &E,
    plan: &Plan<'_, T>,
    tiles: Range<usize>,
    c: &mut [T],
) {
    let packed = plan.args.packed;
    let (n, k) = (packed.n(), packed.k());
    let grid = TileGrid::new(plan.args.m, n, BLOCK_M, K::ISA.block_n());
    let b = packed.as_bytes();
    let sz = plan.args.scale_zero.as_slice();
    let out = SharedMut::new(c);

    executor.parallel_for(tiles.start, tiles.end, 0, |begin, end| {
        for coord in grid.iter_range(begin..end) {
            let e = grid.extent(coord);
            let args = TileArgs {
                a: &plan.a[e.row_start * k..],
                lda: k,
                b: &b[e.col_start * k / 2..],
                ldb: e.cols / 2,
                scale_zero: &sz[e.col_start * 2..],
                ld_sz: 2 * n,
                k,
                group_size: plan.args.group_size,
                // SAFETY: each tile owns rows [row_start, row_start+rows) x
                // columns [col_start, col_start+cols) of C; tiles never overlap.
                out: unsafe { TileOut::new(out.ptr_at(e.row_start * n + e.col_start), n) },
                clamp: plan.clamp,
            };
            // SAFETY: K::ISA was checked available in validate(); slices were
            // bounds-checked against (M, N, K) there, and (rows, cols) are
            // within the table because N is a multiple of 16.
            unsafe { K::launch(&args, e.rows, e.cols) };
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::weight_to_int4pack_with;
    use crate::parallel::SerialExecutor;
    use int4_core::verify::{int4_mm_ref, verify_mm};
    use int4_core::{FpMathMode, IsaPreference};

    fn gen_weights(n: usize, k: usize) -> Vec<i32> {
        (0..n * k)
            .map(|i| ((i as u32).wrapping_mul(2654435761) >> 16) as i32 % 16 - 8)
            .collect()
    }

    fn gen_activations(m: usize, k: usize) -> Vec<f32> {
        (0..m * k).map(|i| ((i * 37 + 13) % 200) as f32 / 100.0 - 1.0).collect()
    }

    fn gen_scale_zero(groups: usize, n: usize) -> ScaleZeroTable<f32> {
        let scales: Vec<f32> = (0..groups * n).map(|i| 0.01 + (i % 7) as f32 * 0.005).collect();
        let zeros: Vec<f32> = (0..groups * n).map(|i| (i % 5) as f32 * 0.01 - 0.02).collect();
        ScaleZeroTable::from_parts(&scales, &zeros, groups, n).unwrap()
    }

    #[test]
    fn test_matches_reference_on_every_variant() {
        let (m, n, k, gs) = (7, 80, 128, 32);
        let w = gen_weights(n, k);
        let a = gen_activations(m, k);
        let sz = gen_scale_zero(k / gs, n);
        let expected = int4_mm_ref(&a, m, &w, n, k, gs, &sz);
        for isa in Isa::available() {
            let packed = weight_to_int4pack_with(&w, n, k, isa, &SerialExecutor).unwrap();
            let c = int4pack_mm(&a, m, &packed, gs, &sz).unwrap();
            let r = verify_mm(&expected, &c, 1e-4, 1e-4);
            assert_eq!(r.fail, 0, "[{}] max diff: {}", isa, r.max_diff);
        }
    }

    #[test]
    fn test_empty_m() {
        let w = gen_weights(16, 32);
        let packed = weight_to_int4pack_with(&w, 16, 32, Isa::Scalar, &SerialExecutor).unwrap();
        let sz = gen_scale_zero(1, 16);
        let c = int4pack_mm::<f32>(&[], 0, &packed, 32, &sz).unwrap();
        assert!(c.is_empty());
    }

    #[test]
    fn test_validation() {
        let (m, n, k) = (2, 16, 64);
        let w = gen_weights(n, k);
        let packed = weight_to_int4pack_with(&w, n, k, Isa::Scalar, &SerialExecutor).unwrap();
        let a = gen_activations(m, k);
        let sz = gen_scale_zero(2, n);

        assert!(matches!(
            int4pack_mm(&a, m, &packed, 48, &sz),
            Err(Int4Error::UnsupportedGroupSize { group_size: 48 })
        ));
        assert!(matches!(
            int4pack_mm(&a, m, &packed, 128, &gen_scale_zero(0, n)),
            Err(Int4Error::InvalidDimension(_))
        ));
        assert!(matches!(
            int4pack_mm(&a[1..], m, &packed, 32, &sz),
            Err(Int4Error::ShapeMismatch { what: "activation", .. })
        ));
        assert!(matches!(
            int4pack_mm(&a, m, &packed, 64, &sz),
            Err(Int4Error::ShapeMismatch { what: "scale/zero groups", .. })
        ));
        let mut c = vec![0.0f32; 3];
        assert!(matches!(
            int4pack_mm_into(&a, m, &packed, 32, &sz, &mut c),
            Err(Int4Error::ShapeMismatch { what: "output", .. })
        ));
    }

    #[test]
    fn test_pinned_isa_must_match_packed() {
        let (m, n, k) = (1, 16, 32);
        let w = gen_weights(n, k);
        let packed = weight_to_int4pack_with(&w, n, k, Isa::Scalar, &SerialExecutor).unwrap();
        let a = gen_activations(m, k);
        let sz = gen_scale_zero(1, n);
        let args = MatmulArgs {
            a: &a,
            m,
            packed: &packed,
            group_size: 32,
            scale_zero: &sz,
        };
        let mut c = vec![0.0f32; m * n];
        let cfg = KernelConfig {
            isa: IsaPreference::Neon,
            ..Default::default()
        };
        let err = int4pack_mm_with(&cfg, &SerialExecutor, args, &mut c).unwrap_err();
        assert!(matches!(err, Int4Error::IsaMismatch { .. }));

        let cfg = KernelConfig {
            isa: IsaPreference::Scalar,
            ..Default::default()
        };
        int4pack_mm_with(&cfg, &SerialExecutor, args, &mut c).unwrap();
    }

    #[test]
    fn test_unavailable_packed_isa_rejected() {
        let missing = Isa::PRIORITY.into_iter().find(|isa| !isa.is_available());
        let Some(isa) = missing else { return };
        let (m, n, k) = (1, 64, 32);
        let w = gen_weights(n, k);
        let packed = weight_to_int4pack_with(&w, n, k, isa, &SerialExecutor).unwrap();
        let sz = gen_scale_zero(1, n);
        let err = int4pack_mm(&gen_activations(m, k), m, &packed, 32, &sz).unwrap_err();
        assert!(matches!(err, Int4Error::IsaUnavailable(_)));
    }

    #[test]
    fn test_tile_range_bounds() {
        let (m, n, k) = (5, 32, 32);
        let w = gen_weights(n, k);
        let packed = weight_to_int4pack_with(&w, n, k, Isa::Scalar, &SerialExecutor).unwrap();
        let a = gen_activations(m, k);
        let sz = gen_scale_zero(1, n);
        let args = MatmulArgs {
            a: &a,
            m,
            packed: &packed,
            group_size: 32,
            scale_zero: &sz,
        };
        assert_eq!(num_tiles(m, &packed), 2);
        let mut c = vec![0.0f32; m * n];
        let cfg = KernelConfig::default();
        assert!(int4pack_mm_tiles(&cfg, &SerialExecutor, args, 1..3, &mut c).is_err());
        int4pack_mm_tiles(&cfg, &SerialExecutor, args, 1..2, &mut c).unwrap();
        // only the second tile row (row 4) was written
        assert!(c[..4 * n].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_fpmath_mode_rounds_f32_activations() {
        let (m, n, k, gs) = (3, 32, 64, 32);
        let w = gen_weights(n, k);
        let packed = weight_to_int4pack_with(&w, n, k, Isa::Scalar, &SerialExecutor).unwrap();
        let a: Vec<f32> = (0..m * k).map(|i| 1.0 + i as f32 * 1e-4).collect();
        let sz = gen_scale_zero(k / gs, n);

        let rounded: Vec<f32> = a.iter().map(|&v| half::bf16::from_f32(v).to_f32()).collect();
        let strict = int4pack_mm(&rounded, m, &packed, gs, &sz).unwrap();

        let cfg = KernelConfig {
            fpmath_mode: FpMathMode::Bf16,
            ..Default::default()
        };
        let args = MatmulArgs {
            a: &a,
            m,
            packed: &packed,
            group_size: gs,
            scale_zero: &sz,
        };
        let mut c = vec![0.0f32; m * n];
        int4pack_mm_with(&cfg, &SerialExecutor, args, &mut c).unwrap();
        assert_eq!(c, strict);
    }

    #[test]
    fn test_clamp_is_fused() {
        let (m, n, k, gs) = (4, 32, 64, 32);
        let w = gen_weights(n, k);
        let a = gen_activations(m, k);
        let sz = gen_scale_zero(k / gs, n);
        for isa in Isa::available() {
            let packed = weight_to_int4pack_with(&w, n, k, isa, &SerialExecutor).unwrap();
            let plain = int4pack_mm(&a, m, &packed, gs, &sz).unwrap();
            let cfg = KernelConfig {
                clamp: Some(OutputClamp::new(-0.05, 0.05).unwrap()),
                ..Default::default()
            };
            let args = MatmulArgs {
                a: &a,
                m,
                packed: &packed,
                group_size: gs,
                scale_zero: &sz,
            };
            let mut c = vec![0.0f32; m * n];
            int4pack_mm_with(&cfg, &SerialExecutor, args, &mut c).unwrap();
            for (x, y) in plain.iter().zip(&c) {
                assert_eq!(x.clamp(-0.05, 0.05), *y, "[{}]", isa);
            }
        }
    }
}
