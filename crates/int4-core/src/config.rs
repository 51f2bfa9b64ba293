//! Kernel configuration.
//!
//! Everything that would otherwise be process-global (variant override,
//! thread count, floating-point math mode) is an explicit value here and is
//! passed to the scheduler per call. `with_env_overrides` is the only place
//! the environment is consulted, and only when the caller asks for it.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use half::{bf16, f16};
use serde::{Deserialize, Serialize};

use crate::error::{Int4Error, Result};
use crate::isa::Isa;

/// Environment variable overriding [`KernelConfig::isa`].
pub const ENV_ISA: &str = "INT4MM_ISA";
/// Environment variable overriding [`KernelConfig::num_threads`].
pub const ENV_NUM_THREADS: &str = "INT4MM_NUM_THREADS";
/// Environment variable overriding [`KernelConfig::fpmath_mode`].
pub const ENV_FPMATH_MODE: &str = "INT4MM_FPMATH_MODE";

/// Kernel variant request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsaPreference {
    /// Best variant the host supports.
    #[default]
    Auto,
    Scalar,
    Avx2,
    Avx512,
    Neon,
    WasmSimd,
}

impl IsaPreference {
    /// The pinned variant, or `None` for `Auto`.
    pub fn pinned(self) -> Option<Isa> {
        match self {
            IsaPreference::Auto => None,
            IsaPreference::Scalar => Some(Isa::Scalar),
            IsaPreference::Avx2 => Some(Isa::Avx2),
            IsaPreference::Avx512 => Some(Isa::Avx512),
            IsaPreference::Neon => Some(Isa::Neon),
            IsaPreference::WasmSimd => Some(Isa::WasmSimd),
        }
    }
}

impl FromStr for IsaPreference {
    type Err = Int4Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(IsaPreference::Auto),
            "scalar" => Ok(IsaPreference::Scalar),
            "avx2" => Ok(IsaPreference::Avx2),
            "avx512" => Ok(IsaPreference::Avx512),
            "neon" => Ok(IsaPreference::Neon),
            "wasm_simd" | "wasm" => Ok(IsaPreference::WasmSimd),
            other => Err(Int4Error::InvalidConfig(format!("unknown ISA '{}'", other))),
        }
    }
}

/// How far f32 activations may be implicitly down-converted.
///
/// Only affects f32 inputs: `Strict` leaves them untouched, the other modes
/// round every activation to the named type's precision before the GEMM.
/// `Any` picks bf16, the cheapest type every variant tolerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FpMathMode {
    #[default]
    Strict,
    Bf16,
    F16,
    Tf32,
    Any,
}

impl FpMathMode {
    pub fn name(self) -> &'static str {
        match self {
            FpMathMode::Strict => "strict",
            FpMathMode::Bf16 => "bf16",
            FpMathMode::F16 => "f16",
            FpMathMode::Tf32 => "tf32",
            FpMathMode::Any => "any",
        }
    }

    pub fn is_strict(self) -> bool {
        self == FpMathMode::Strict
    }

    /// Round `v` to the precision this mode allows.
    #[inline]
    pub fn round(self, v: f32) -> f32 {
        match self {
            FpMathMode::Strict => v,
            FpMathMode::Bf16 | FpMathMode::Any => bf16::from_f32(v).to_f32(),
            FpMathMode::F16 => f16::from_f32(v).to_f32(),
            FpMathMode::Tf32 => round_tf32(v),
        }
    }
}

impl fmt::Display for FpMathMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FpMathMode {
    type Err = Int4Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(FpMathMode::Strict),
            "bf16" => Ok(FpMathMode::Bf16),
            "f16" => Ok(FpMathMode::F16),
            "tf32" => Ok(FpMathMode::Tf32),
            "any" => Ok(FpMathMode::Any),
            other => Err(Int4Error::InvalidConfig(format!(
                "unknown fpmath mode '{}'",
                other
            ))),
        }
    }
}

/// Round to 10 explicit mantissa bits, ties to even.
fn round_tf32(v: f32) -> f32 {
    if !v.is_finite() {
        return v;
    }
    let bits = v.to_bits();
    let lsb = (bits >> 13) & 1;
    f32::from_bits(bits.wrapping_add(0x0FFF + lsb) & !0x1FFF)
}

/// Clamp applied to the f32 accumulators before they are narrowed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputClamp {
    pub min: f32,
    pub max: f32,
}

impl OutputClamp {
    pub fn new(min: f32, max: f32) -> Result<Self> {
        let clamp = Self { min, max };
        clamp.validate()?;
        Ok(clamp)
    }

    /// `max(x, 0)`.
    pub fn relu() -> Self {
        Self {
            min: 0.0,
            max: f32::INFINITY,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min.is_nan() || self.max.is_nan() {
            return Err(Int4Error::InvalidConfig("clamp bounds must not be NaN".into()));
        }
        if self.min > self.max {
            return Err(Int4Error::InvalidConfig(format!(
                "clamp min {} exceeds max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// NaN inputs clamp to `min`.
    #[inline(always)]
    pub fn apply(&self, v: f32) -> f32 {
        v.max(self.min).min(self.max)
    }
}

/// Per-call kernel configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Kernel variant to use.
    pub isa: IsaPreference,

    /// Worker threads; `None` uses the global rayon pool.
    pub num_threads: Option<usize>,

    /// Implicit down-conversion allowed for f32 activations.
    pub fpmath_mode: FpMathMode,

    /// Output clamp fused into the store.
    pub clamp: Option<OutputClamp>,
}

impl KernelConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Int4Error::InvalidConfig(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        log::info!(
            "Loaded kernel config from {}: isa={:?}, fpmath={}",
            path.as_ref().display(),
            config.isa,
            config.fpmath_mode
        );
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_threads == Some(0) {
            return Err(Int4Error::InvalidConfig("num_threads must be at least 1".into()));
        }
        if let Some(clamp) = &self.clamp {
            clamp.validate()?;
        }
        Ok(())
    }

    /// Apply `INT4MM_ISA`, `INT4MM_NUM_THREADS` and `INT4MM_FPMATH_MODE`.
    ///
    /// Unparsable values are logged and ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_ISA) {
            match v.parse() {
                Ok(isa) => self.isa = isa,
                Err(e) => log::warn!("Ignoring {}={:?}: {}", ENV_ISA, v, e),
            }
        }
        if let Some(v) = lookup(ENV_NUM_THREADS) {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.num_threads = Some(n),
                _ => log::warn!("Ignoring {}={:?}: expected a positive integer", ENV_NUM_THREADS, v),
            }
        }
        if let Some(v) = lookup(ENV_FPMATH_MODE) {
            match v.parse() {
                Ok(mode) => self.fpmath_mode = mode,
                Err(e) => log::warn!("Ignoring {}={:?}: {}", ENV_FPMATH_MODE, v, e),
            }
        }
        self
    }

    /// The variant this configuration selects on the current host.
    pub fn resolve_isa(&self) -> Result<Isa> {
        match self.isa.pinned() {
            None => Ok(Isa::detect()),
            Some(isa) if isa.is_available() => Ok(isa),
            Some(isa) => Err(Int4Error::IsaUnavailable(isa.name())),
        }
    }
}
