//! Kernel variant selection and the tile shape constants each variant fixes.
//!
//! ```text
//! Priority  Variant     W    BLOCK_N  Requirement          Platform
//! ────────  ──────────  ───  ───────  ───────────────────  ──────────
//! 1         AVX-512     16   64       AVX-512F + AVX2/FMA  x86_64
//! 2         AVX2        8    32       AVX2 + FMA           x86_64
//! 3         NEON        4    16       NEON                 aarch64
//! 4         WASM SIMD   4    16       simd128 (build-time) wasm32
//! 5         Scalar      8    32       Portable             Any
//! ```
//!
//! The scalar variant keeps the 256-bit register width of the AVX2 variant
//! so its tile shapes (and therefore its packed layout granularity) stay
//! within the 16/32 column set.
//!
//! Feature detection goes through `std`'s detection macros, which resolve to
//! constants when the build already enables the features statically.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::layout::NibblePairing;

/// Rows per output tile, shared by every variant.
pub const BLOCK_M: usize = 4;

/// Smallest column granule a tile may have.
pub const NB_GRANULE: usize = 16;

/// Widest BLOCK_N across all variants.
pub const MAX_BLOCK_N: usize = 64;

/// A kernel variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isa {
    Scalar,
    Avx2,
    Avx512,
    Neon,
    WasmSimd,
}

impl Isa {
    /// All variants in selection priority order.
    pub const PRIORITY: [Isa; 5] = [Isa::Avx512, Isa::Avx2, Isa::Neon, Isa::WasmSimd, Isa::Scalar];

    /// f32 lanes per vector register.
    pub const fn vector_width(self) -> usize {
        match self {
            Isa::Avx512 => 16,
            Isa::Avx2 | Isa::Scalar => 8,
            Isa::Neon | Isa::WasmSimd => 4,
        }
    }

    /// Tile width: four vector registers.
    pub const fn block_n(self) -> usize {
        4 * self.vector_width()
    }

    pub fn name(self) -> &'static str {
        match self {
            Isa::Scalar => "scalar",
            Isa::Avx2 => "avx2",
            Isa::Avx512 => "avx512",
            Isa::Neon => "neon",
            Isa::WasmSimd => "wasm_simd",
        }
    }

    /// Whether this variant can run on the current CPU.
    pub fn is_available(self) -> bool {
        match self {
            Isa::Scalar => true,
            Isa::Avx2 => has_avx2_fma(),
            Isa::Avx512 => has_avx512(),
            Isa::Neon => has_neon(),
            Isa::WasmSimd => cfg!(all(target_arch = "wasm32", target_feature = "simd128")),
        }
    }

    /// Best available variant.
    pub fn detect() -> Isa {
        Isa::PRIORITY
            .into_iter()
            .find(|isa| isa.is_available())
            .unwrap_or(Isa::Scalar)
    }

    /// Every variant that can run here, best first.
    pub fn available() -> Vec<Isa> {
        Isa::PRIORITY
            .into_iter()
            .filter(|isa| isa.is_available())
            .collect()
    }

    /// Whether the kernel dispatch table has a specialization for an
    /// `mb` x `nb` tile.
    pub fn supports_tile(self, mb: usize, nb: usize) -> bool {
        (1..=BLOCK_M).contains(&mb)
            && nb > 0
            && nb.is_multiple_of(NB_GRANULE)
            && nb <= self.block_n()
    }

    /// Which columns share a byte in an `nb`-wide block of this variant's
    /// packed layout.
    ///
    /// Full-width vector blocks pair column `j` with `j + nb/2` so a single
    /// wide load plus mask/shift yields two column vectors. Remainder blocks,
    /// and every block of the scalar variant, pair adjacent columns.
    pub fn pairing(self, nb: usize) -> NibblePairing {
        match self {
            Isa::Scalar => NibblePairing::Adjacent,
            _ if nb == self.block_n() => NibblePairing::Strided,
            _ => NibblePairing::Adjacent,
        }
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(target_arch = "x86_64")]
fn has_avx2_fma() -> bool {
    std::arch::is_x86_feature_detected!("avx2") && std::arch::is_x86_feature_detected!("fma")
}

#[cfg(not(target_arch = "x86_64"))]
fn has_avx2_fma() -> bool {
    false
}

#[cfg(target_arch = "x86_64")]
fn has_avx512() -> bool {
    std::arch::is_x86_feature_detected!("avx512f") && has_avx2_fma()
}

#[cfg(not(target_arch = "x86_64"))]
fn has_avx512() -> bool {
    false
}

#[cfg(target_arch = "aarch64")]
fn has_neon() -> bool {
    std::arch::is_aarch64_feature_detected!("neon")
}

#[cfg(not(target_arch = "aarch64"))]
fn has_neon() -> bool {
    false
}
