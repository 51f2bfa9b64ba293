//! Per-group scale/zero-point table.

use crate::element::Element;
use crate::error::{Int4Error, Result};

/// Interleaved `(scale, zero)` pairs of shape `(K / group_size, N, 2)`.
///
/// For group `g` and column `n`, `dequant = int4 * scale + zero` with
/// `scale = data[(g * N + n) * 2]` and `zero = data[(g * N + n) * 2 + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleZeroTable<T> {
    data: Vec<T>,
    groups: usize,
    n: usize,
}

impl<T: Element> ScaleZeroTable<T> {
    /// Wrap an already interleaved buffer.
    pub fn from_interleaved(data: Vec<T>, groups: usize, n: usize) -> Result<Self> {
        if data.len() != groups * n * 2 {
            return Err(Int4Error::ShapeMismatch {
                what: "scale/zero table",
                expected: groups * n * 2,
                actual: data.len(),
            });
        }
        Ok(Self { data, groups, n })
    }

    /// Interleave separate `(groups, N)` scale and zero matrices.
    pub fn from_parts(scales: &[T], zeros: &[T], groups: usize, n: usize) -> Result<Self> {
        for (what, part) in [("scales", scales), ("zeros", zeros)] {
            if part.len() != groups * n {
                return Err(Int4Error::ShapeMismatch {
                    what,
                    expected: groups * n,
                    actual: part.len(),
                });
            }
        }
        let data = scales
            .iter()
            .zip(zeros)
            .flat_map(|(&s, &z)| [s, z])
            .collect();
        Ok(Self { data, groups, n })
    }

    /// Every column in every group shares one `(scale, zero)`.
    pub fn uniform(groups: usize, n: usize, scale: f32, zero: f32) -> Self {
        let pair = [T::from_f32(scale), T::from_f32(zero)];
        Self {
            data: pair.repeat(groups * n),
            groups,
            n,
        }
    }

    pub fn groups(&self) -> usize {
        self.groups
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Distance between consecutive groups in the interleaved buffer.
    pub fn group_stride(&self) -> usize {
        2 * self.n
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn scale(&self, group: usize, col: usize) -> T {
        self.data[(group * self.n + col) * 2]
    }

    pub fn zero(&self, group: usize, col: usize) -> T {
        self.data[(group * self.n + col) * 2 + 1]
    }
}
