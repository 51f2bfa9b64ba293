//! Fuzz target for int4 packing/unpacking.
//!
//! Tests for:
//! - No panics on arbitrary (including out-of-range) weights
//! - Roundtrip correctness for in-range weights
//! - Error (not panic) on invalid dimensions

#![no_main]

use int4_core::layout::encode_nibble;
use int4_core::Isa;
use int4_kernels::{weight_to_int4pack_with, SerialExecutor};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let isa = Isa::PRIORITY[data[0] as usize % Isa::PRIORITY.len()];
    let n = (data[1] as usize % 12) * 8;
    let k = data[2] as usize % 64;
    let body = &data[3..];

    let weights: Vec<i32> = (0..n * k)
        .map(|i| body.get(i % body.len().max(1)).copied().unwrap_or(0) as i8 as i32 + (i as i32 % 3) * 64)
        .collect();

    match weight_to_int4pack_with(&weights, n, k, isa, &SerialExecutor) {
        Ok(packed) => {
            assert!(n % 16 == 0 && k % 2 == 0 && n > 0 && k > 0);
            assert_eq!(packed.as_bytes().len(), n * k / 2);
            let unpacked = packed.unpack();
            for (w, u) in weights.iter().zip(&unpacked) {
                // truncation to the low nibble is the only transformation
                assert_eq!(encode_nibble(*w), encode_nibble(*u));
                assert!((-8..=7).contains(u));
            }
        }
        Err(e) => {
            assert!(e.is_configuration_error());
        }
    }
});
