//! int4 weight packer.
//!
//! Splits N into BLOCK_N-column blocks of the target variant and packs each
//! one independently (see `int4_core::layout`), in parallel across blocks.

use int4_core::layout::{check_pack_dims, pack_block};
use int4_core::{Int4Error, Isa, KernelConfig, PackedWeights, Result};

use crate::dispatch::selected_isa;
use crate::parallel::{ParallelExecutor, RayonExecutor, SharedMut};

/// Pack N x K weights in [-8, 7] for this host's kernel variant.
pub fn weight_to_int4pack(weight: &[i32], n: usize, k: usize) -> Result<PackedWeights> {
    weight_to_int4pack_with(weight, n, k, selected_isa(), &RayonExecutor::global())
}

/// Pack for the variant `config` selects, on an executor sized by
/// `config.num_threads`.
pub fn weight_to_int4pack_config(
    config: &KernelConfig,
    weight: &[i32],
    n: usize,
    k: usize,
) -> Result<PackedWeights> {
    config.validate()?;
    let isa = config.resolve_isa()?;
    let executor = RayonExecutor::from_config(config)?;
    weight_to_int4pack_with(weight, n, k, isa, &executor)
}

/// Pack for an explicit variant, which need not be available on this host.
pub fn weight_to_int4pack_with<E: ParallelExecutor>(
    weight: &[i32],
    n: usize,
    k: usize,
    isa: Isa,
    executor: &E,
) -> Result<PackedWeights> {
    let mut packed = PackedWeights::zeroed(n, k, isa)?;
    weight_to_int4pack_into(weight, n, k, isa, executor, packed.as_mut_bytes())?;
    Ok(packed)
}

/// Pack into a caller-owned buffer of exactly `n * k / 2` bytes.
pub fn weight_to_int4pack_into<E: ParallelExecutor>(
    weight: &[i32],
    n: usize,
    k: usize,
    isa: Isa,
    executor: &E,
    dst: &mut [u8],
) -> Result<()> {
    check_pack_dims(n, k)?;
    if weight.len() != n * k {
        return Err(Int4Error::ShapeMismatch {
            what: "weight",
            expected: n * k,
            actual: weight.len(),
        });
    }
    if dst.len() != n * k / 2 {
        return Err(Int4Error::ShapeMismatch {
            what: "packed weight buffer",
            expected: n * k / 2,
            actual: dst.len(),
        });
    }

    let block_n = isa.block_n();
    let num_blocks = n.div_ceil(block_n);
    log::debug!(
        "weight_to_int4pack: N={} K={} isa={} blocks={}",
        n,
        k,
        isa,
        num_blocks
    );

    let out = SharedMut::new(dst);
    executor.parallel_for(0, num_blocks, 0, |begin, end| {
        for block in begin..end {
            let n_start = block * block_n;
            let nb = block_n.min(n - n_start);
            // SAFETY: block i owns bytes [i*K*BLOCK_N/2, i*K*BLOCK_N/2 + K*nb/2),
            // which are in bounds and disjoint across blocks.
            let block_dst = unsafe { out.slice_mut(n_start * k / 2, nb * k / 2) };
            pack_block(
                &weight[n_start * k..(n_start + nb) * k],
                k,
                nb,
                isa.pairing(nb),
                block_dst,
            );
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialExecutor;

    fn gen_weights(n: usize, k: usize) -> Vec<i32> {
        (0..n * k)
            .map(|i| ((i as u32).wrapping_mul(2654435761) >> 16) as i32 % 16 - 8)
            .collect()
    }

    #[test]
    fn test_pack_unpack_every_variant() {
        for isa in Isa::PRIORITY {
            for &(n, k) in &[(16, 32), (48, 64), (80, 128), (112, 34)] {
                let w = gen_weights(n, k);
                let packed = weight_to_int4pack_with(&w, n, k, isa, &SerialExecutor).unwrap();
                assert_eq!(packed.as_bytes().len(), n * k / 2);
                assert_eq!(packed.unpack(), w, "[{}] N={} K={}", isa, n, k);
            }
        }
    }

    #[test]
    fn test_parallel_matches_serial() {
        let (n, k) = (208, 256);
        let w = gen_weights(n, k);
        let ex = RayonExecutor::with_threads(4).unwrap();
        for isa in Isa::PRIORITY {
            let serial = weight_to_int4pack_with(&w, n, k, isa, &SerialExecutor).unwrap();
            let parallel = weight_to_int4pack_with(&w, n, k, isa, &ex).unwrap();
            assert_eq!(serial, parallel, "[{}]", isa);
        }
    }

    #[test]
    fn test_avx512_full_block_pairs_lane_j_with_j_plus_32() {
        let (n, k) = (64, 2);
        // column c holds c % 16 - 8 -> nibble c % 16
        let w: Vec<i32> = (0..n * k).map(|i| ((i / k) % 16) as i32 - 8).collect();
        let packed = weight_to_int4pack_with(&w, n, k, Isa::Avx512, &SerialExecutor).unwrap();
        let row0 = &packed.as_bytes()[..32];
        for (j, &byte) in row0.iter().enumerate() {
            assert_eq!(byte & 0x0F, (j % 16) as u8);
            assert_eq!(byte >> 4, ((j + 32) % 16) as u8);
        }
    }

    #[test]
    fn test_default_entry_uses_selected_variant() {
        let w = gen_weights(32, 64);
        let packed = weight_to_int4pack(&w, 32, 64).unwrap();
        assert_eq!(packed.isa(), selected_isa());
        assert_eq!(packed.unpack(), w);
    }

    #[test]
    fn test_config_pins_variant() {
        let w = gen_weights(48, 64);
        let cfg = KernelConfig::default().with_overrides(|key| match key {
            "INT4MM_ISA" => Some("scalar".to_string()),
            "INT4MM_NUM_THREADS" => Some("2".to_string()),
            _ => None,
        });
        let packed = weight_to_int4pack_config(&cfg, &w, 48, 64).unwrap();
        assert_eq!(packed.isa(), Isa::Scalar);
        assert_eq!(packed.unpack(), w);

        let auto = weight_to_int4pack_config(&KernelConfig::default(), &w, 48, 64).unwrap();
        assert_eq!(auto.isa(), Isa::detect());
    }

    #[test]
    fn test_config_rejects_zero_threads() {
        let w = gen_weights(16, 32);
        let cfg = KernelConfig {
            num_threads: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            weight_to_int4pack_config(&cfg, &w, 16, 32),
            Err(Int4Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validation_errors() {
        let w = vec![0i32; 16 * 32];
        assert!(matches!(
            weight_to_int4pack(&w[..100], 16, 32),
            Err(Int4Error::ShapeMismatch { what: "weight", .. })
        ));
        assert!(matches!(
            weight_to_int4pack(&w, 8, 64),
            Err(Int4Error::InvalidDimension(_))
        ));
        let mut short = vec![0u8; 10];
        assert!(weight_to_int4pack_into(&w, 16, 32, Isa::Scalar, &SerialExecutor, &mut short).is_err());
    }

    #[test]
    fn test_out_of_range_weights_do_not_panic() {
        let w: Vec<i32> = (0..16 * 32i32).map(|i| i * 1000 - 7).collect();
        let packed = weight_to_int4pack_with(&w, 16, 32, Isa::Scalar, &SerialExecutor).unwrap();
        assert!(packed.unpack().iter().all(|v| (-8..=7).contains(v)));
    }
}
