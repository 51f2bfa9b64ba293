//! Process-wide kernel variant selection.
//!
//! ```text
//! Priority  Kernel              Requirement          Platform
//! ────────  ──────────────────  ───────────────────  ──────────
//! 1         AVX-512 LUT-permute AVX-512F + FMA       x86_64
//! 2         AVX2 mask/shift     AVX2 + FMA           x86_64
//! 3         NEON mask/shift     NEON                 aarch64
//! 4         WASM SIMD           simd128 (build)      wasm32
//! 5         Scalar LUT          Portable             Any
//! ```
//!
//! The variant is detected once and cached; nothing inside the scheduler
//! or the kernels re-checks CPU features. Packed weights remember the
//! variant they were laid out for, and matmul always runs that variant.

use once_cell::sync::Lazy;

use int4_core::Isa;

static SELECTED: Lazy<Isa> = Lazy::new(|| {
    let isa = Isa::detect();
    log::debug!(
        "int4mm: selected {} kernel (W={}, BLOCK_N={})",
        isa,
        isa.vector_width(),
        isa.block_n()
    );
    isa
});

/// Best variant on this host, detected once per process.
pub fn selected_isa() -> Isa {
    *SELECTED
}

/// Name of the selected variant, for logs and benchmark labels.
pub fn selected_kernel_name() -> &'static str {
    selected_isa().name()
}

pub use crate::pack::{
    weight_to_int4pack, weight_to_int4pack_config, weight_to_int4pack_into, weight_to_int4pack_with,
};
pub use crate::scheduler::{
    int4pack_mm, int4pack_mm_config, int4pack_mm_into, int4pack_mm_tiles, int4pack_mm_with,
};
