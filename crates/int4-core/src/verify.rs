//! Reference GEMM and comparison harness.
//!
//! The naive triple loop here is the ground truth every kernel variant is
//! cross-validated against.

use crate::element::Element;
use crate::scale_zero::ScaleZeroTable;

/// `C[m, n] = sum_k A[m, k] * (W[n, k] * scale[k / gs, n] + zero[k / gs, n])`,
/// accumulated in f32 over k = 0..K in order. No packing, no tiling.
pub fn int4_mm_ref<T: Element>(
    a: &[T],
    m: usize,
    weight: &[i32],
    n: usize,
    k: usize,
    group_size: usize,
    scale_zero: &ScaleZeroTable<T>,
) -> Vec<f32> {
    assert_eq!(a.len(), m * k, "activation length mismatch");
    assert_eq!(weight.len(), n * k, "weight length mismatch");
    assert_eq!(scale_zero.groups(), k / group_size, "scale/zero group count mismatch");

    let mut c = vec![0.0f32; m * n];
    for row in 0..m {
        for col in 0..n {
            let mut acc = 0.0f32;
            for kk in 0..k {
                let g = kk / group_size;
                let scale = scale_zero.scale(g, col).to_f32();
                let zero = scale_zero.zero(g, col).to_f32();
                let w = weight[col * k + kk] as f32 * scale + zero;
                acc += a[row * k + kk].to_f32() * w;
            }
            c[row * n + col] = acc;
        }
    }
    c
}

/// Result of a verification pass.
#[derive(Debug)]
pub struct TestResult {
    pub pass: usize,
    pub fail: usize,
    pub max_diff: f32,
}

/// Compare kernel output against reference values.
///
/// An element passes when `|expected - actual| <= atol + rtol * |expected|`.
pub fn verify_mm<T: Element>(expected: &[f32], actual: &[T], rtol: f32, atol: f32) -> TestResult {
    assert_eq!(expected.len(), actual.len(), "verify_mm length mismatch");

    let mut max_diff = 0.0f32;
    let mut fail = 0;
    for (&e, a) in expected.iter().zip(actual) {
        let a = a.to_f32();
        let diff = (e - a).abs();
        // NaN never compares, so count it explicitly.
        if diff.is_nan() || diff > atol + rtol * e.abs() {
            fail += 1;
        }
        if diff > max_diff {
            max_diff = diff;
        }
    }

    TestResult {
        pass: expected.len() - fail,
        fail,
        max_diff,
    }
}
