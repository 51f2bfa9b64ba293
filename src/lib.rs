//! int4mm: blocked int4 dequant-GEMM for CPUs.
//!
//! ```no_run
//! use int4mm::{int4pack_mm, weight_to_int4pack, ScaleZeroTable};
//!
//! # fn main() -> int4mm::Result<()> {
//! let (m, n, k, group_size) = (4, 64, 256, 128);
//! let weight = vec![3i32; n * k]; // values in [-8, 7]
//! let packed = weight_to_int4pack(&weight, n, k)?;
//! let scale_zero = ScaleZeroTable::<f32>::uniform(k / group_size, n, 0.02, 0.0);
//! let a = vec![1.0f32; m * k];
//! let c = int4pack_mm(&a, m, &packed, group_size, &scale_zero)?;
//! assert_eq!(c.len(), m * n);
//! # Ok(())
//! # }
//! ```

pub use int4_core::{
    config, element, error, isa, layout, verify, DType, Element, FpMathMode, Int4Error, Isa,
    IsaPreference, KernelConfig, OutputClamp, PackedWeights, Result, ScaleZeroTable, BLOCK_M,
    SUPPORTED_GROUP_SIZES,
};
pub use int4_kernels::{
    dispatch, int4pack_mm, int4pack_mm_config, int4pack_mm_into, int4pack_mm_tiles,
    int4pack_mm_with, num_tiles, tile, weight_to_int4pack, weight_to_int4pack_config,
    weight_to_int4pack_into, weight_to_int4pack_with, MatmulArgs,
    ParallelExecutor, RayonExecutor, SerialExecutor,
};

pub use half::{bf16, f16};
