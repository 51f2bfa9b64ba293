//! Error types for int4 packing and dequant-GEMM.
//!
//! Every variant except `Io` describes a caller or configuration defect.
//! None of them are transient, so nothing here is worth retrying.

use thiserror::Error;

/// Main error type for int4mm operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Int4Error {
    /// A buffer length does not match the shape implied by (M, N, K).
    #[error("Shape mismatch for {what}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A matrix dimension violates a layout constraint.
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),

    /// Quantization group size outside the supported set.
    #[error("Unsupported group size {group_size} (supported: 32, 64, 128, 256)")]
    UnsupportedGroupSize { group_size: usize },

    /// The requested kernel variant cannot run on this CPU.
    #[error("ISA variant {0} is not available on this host")]
    IsaUnavailable(&'static str),

    /// Packed weights were laid out for a different kernel variant.
    #[error("Packed weights use the {packed} layout, but {requested} was requested")]
    IsaMismatch {
        packed: &'static str,
        requested: &'static str,
    },

    /// Invalid kernel configuration detected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Int4Error>;

impl Int4Error {
    /// True for caller/configuration defects, false for I/O failures.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, Int4Error::Io(_))
    }
}
