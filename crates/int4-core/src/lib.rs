//! Data model for blocked int4 dequant-GEMM.
//!
//! Packed weight layout, per-group scale/zero tables, kernel variant
//! selection, configuration and the reference GEMM used to validate the
//! kernels in `int4-kernels`.

pub mod aligned;
pub mod config;
pub mod element;
pub mod error;
pub mod isa;
pub mod layout;
pub mod packed;
pub mod scale_zero;
pub mod verify;

pub use config::{FpMathMode, IsaPreference, KernelConfig, OutputClamp};
pub use element::{DType, Element};
pub use error::{Int4Error, Result};
pub use isa::{Isa, BLOCK_M, MAX_BLOCK_N};
pub use packed::PackedWeights;
pub use scale_zero::ScaleZeroTable;

/// Group sizes the kernels accept.
pub const SUPPORTED_GROUP_SIZES: [usize; 4] = [32, 64, 128, 256];
