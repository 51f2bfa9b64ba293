//! Fuzz target for the tile scheduler.
//!
//! Arbitrary shapes and group sizes must either compute a result that
//! matches the reference or return an error; they must never panic or
//! touch memory out of bounds.

#![no_main]

use int4_core::verify::{int4_mm_ref, verify_mm};
use int4_core::{Isa, ScaleZeroTable};
use int4_kernels::{int4pack_mm, weight_to_int4pack_with, SerialExecutor};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 5 {
        return;
    }
    let available = Isa::available();
    let isa = available[data[0] as usize % available.len()];
    let m = data[1] as usize % 10;
    let n = (data[2] as usize % 8 + 1) * 16;
    let group_size = [16, 32, 64, 128][data[3] as usize % 4];
    let k = (data[4] as usize % 4 + 1) * 32;
    let body = &data[5..];
    let byte = |i: usize| body.get(i % body.len().max(1)).copied().unwrap_or(1);

    let weights: Vec<i32> = (0..n * k).map(|i| (byte(i) % 16) as i32 - 8).collect();
    let a: Vec<f32> = (0..m * k).map(|i| byte(i + 1) as f32 / 128.0 - 1.0).collect();
    let groups = k / group_size.max(1);
    let sz = ScaleZeroTable::<f32>::uniform(groups, n, 0.03, -0.01);

    let packed = match weight_to_int4pack_with(&weights, n, k, isa, &SerialExecutor) {
        Ok(p) => p,
        Err(_) => return,
    };
    match int4pack_mm(&a, m, &packed, group_size, &sz) {
        Ok(c) => {
            let expected = int4_mm_ref(&a, m, &weights, n, k, group_size, &sz);
            let r = verify_mm(&expected, &c, 1e-4, 1e-3);
            assert_eq!(r.fail, 0, "[{}] max diff {}", isa, r.max_diff);
        }
        Err(e) => assert!(e.is_configuration_error()),
    }
});
