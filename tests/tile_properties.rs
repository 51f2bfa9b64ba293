//! Tiling properties: boundary tiles behave like zero padding, results do
//! not depend on threading, and disjoint tile ranges compose.

use int4mm::{
    int4pack_mm_tiles, int4pack_mm_with, num_tiles, weight_to_int4pack_with, Isa, KernelConfig,
    MatmulArgs, RayonExecutor, ScaleZeroTable, SerialExecutor, BLOCK_M,
};

fn gen_weights(n: usize, k: usize) -> Vec<i32> {
    (0..n * k)
        .map(|i| ((i as u32).wrapping_mul(2654435761) >> 16) as i32 % 16 - 8)
        .collect()
}

fn gen_activations(m: usize, k: usize) -> Vec<f32> {
    (0..m * k).map(|i| ((i * 37 + 13) % 200) as f32 / 100.0 - 1.0).collect()
}

fn gen_scale_zero(groups: usize, n: usize) -> (Vec<f32>, Vec<f32>) {
    let scales = (0..groups * n).map(|i| 0.01 + (i % 13) as f32 * 0.003).collect();
    let zeros = (0..groups * n).map(|i| (i % 7) as f32 * 0.01 - 0.03).collect();
    (scales, zeros)
}

/// One matmul problem in logical (unpacked) form.
struct Problem<'a> {
    a: &'a [f32],
    m: usize,
    w: &'a [i32],
    n: usize,
    k: usize,
    sz: &'a ScaleZeroTable<f32>,
}

fn run(isa: Isa, executor: &RayonExecutor, p: &Problem<'_>) -> Vec<f32> {
    let packed = weight_to_int4pack_with(p.w, p.n, p.k, isa, &SerialExecutor).unwrap();
    let args = MatmulArgs {
        a: p.a,
        m: p.m,
        packed: &packed,
        group_size: 32,
        scale_zero: p.sz,
    };
    let mut c = vec![f32::NAN; p.m * p.n];
    int4pack_mm_with(&KernelConfig::default(), executor, args, &mut c).unwrap();
    c
}

#[test]
fn test_boundary_tiles_equal_zero_padding() {
    let k = 64;
    let groups = k / 32;
    let ex = RayonExecutor::global();
    for isa in Isa::available() {
        for &(m, n) in &[(1usize, 16usize), (3, 48), (5, 80), (6, 16), (9, 112)] {
            let m_pad = m.div_ceil(BLOCK_M) * BLOCK_M;
            let n_pad = n.div_ceil(isa.block_n()) * isa.block_n();

            let a = gen_activations(m, k);
            let w = gen_weights(n, k);
            let (scales, zeros) = gen_scale_zero(groups, n);
            let sz = ScaleZeroTable::from_parts(&scales, &zeros, groups, n).unwrap();

            let mut a_pad = vec![0.0f32; m_pad * k];
            a_pad[..m * k].copy_from_slice(&a);
            let mut w_pad = vec![0i32; n_pad * k];
            w_pad[..n * k].copy_from_slice(&w);
            let mut s_pad = vec![1.0f32; groups * n_pad];
            let mut z_pad = vec![0.0f32; groups * n_pad];
            for g in 0..groups {
                s_pad[g * n_pad..g * n_pad + n].copy_from_slice(&scales[g * n..(g + 1) * n]);
                z_pad[g * n_pad..g * n_pad + n].copy_from_slice(&zeros[g * n..(g + 1) * n]);
            }
            let sz_pad = ScaleZeroTable::from_parts(&s_pad, &z_pad, groups, n_pad).unwrap();

            let c = run(isa, &ex, &Problem { a: &a, m, w: &w, n, k, sz: &sz });
            let padded = Problem {
                a: &a_pad,
                m: m_pad,
                w: &w_pad,
                n: n_pad,
                k,
                sz: &sz_pad,
            };
            let c_pad = run(isa, &ex, &padded);
            for row in 0..m {
                for col in 0..n {
                    assert_eq!(
                        c[row * n + col].to_bits(),
                        c_pad[row * n_pad + col].to_bits(),
                        "[{}] M={} N={} at ({}, {})",
                        isa,
                        m,
                        n,
                        row,
                        col
                    );
                }
            }
        }
    }
}

#[test]
fn test_deterministic_across_thread_counts() {
    let (m, n, k) = (37, 208, 256);
    let a = gen_activations(m, k);
    let w = gen_weights(n, k);
    let (scales, zeros) = gen_scale_zero(k / 32, n);
    let sz = ScaleZeroTable::from_parts(&scales, &zeros, k / 32, n).unwrap();

    for isa in Isa::available() {
        let packed = weight_to_int4pack_with(&w, n, k, isa, &SerialExecutor).unwrap();
        let args = MatmulArgs {
            a: &a,
            m,
            packed: &packed,
            group_size: 32,
            scale_zero: &sz,
        };
        let cfg = KernelConfig::default();
        let mut reference = vec![0.0f32; m * n];
        int4pack_mm_with(&cfg, &SerialExecutor, args, &mut reference).unwrap();

        for threads in [1, 3, 8] {
            let ex = RayonExecutor::with_threads(threads).unwrap();
            for _ in 0..3 {
                let mut c = vec![0.0f32; m * n];
                int4pack_mm_with(&cfg, &ex, args, &mut c).unwrap();
                let same = c.iter().zip(&reference).all(|(x, y)| x.to_bits() == y.to_bits());
                assert!(same, "[{}] threads={} output differs from serial run", isa, threads);
            }
        }
    }
}

#[test]
fn test_tiling_is_additive() {
    let (m, n, k) = (11, 144, 128);
    let a = gen_activations(m, k);
    let w = gen_weights(n, k);
    let (scales, zeros) = gen_scale_zero(k / 32, n);
    let sz = ScaleZeroTable::from_parts(&scales, &zeros, k / 32, n).unwrap();
    let cfg = KernelConfig::default();

    for isa in Isa::available() {
        let packed = weight_to_int4pack_with(&w, n, k, isa, &SerialExecutor).unwrap();
        let args = MatmulArgs {
            a: &a,
            m,
            packed: &packed,
            group_size: 32,
            scale_zero: &sz,
        };
        let total = num_tiles(m, &packed);
        let mut full = vec![0.0f32; m * n];
        int4pack_mm_with(&cfg, &SerialExecutor, args, &mut full).unwrap();

        // every split point, each piece computed by a separate call
        for split in 0..=total {
            let mut pieces = vec![0.0f32; m * n];
            int4pack_mm_tiles(&cfg, &SerialExecutor, args, 0..split, &mut pieces).unwrap();
            int4pack_mm_tiles(&cfg, &RayonExecutor::global(), args, split..total, &mut pieces)
                .unwrap();
            assert_eq!(pieces, full, "[{}] split at tile {}", isa, split);
        }

        // single tiles in reverse order
        let mut one_by_one = vec![0.0f32; m * n];
        for t in (0..total).rev() {
            int4pack_mm_tiles(&cfg, &SerialExecutor, args, t..t + 1, &mut one_by_one).unwrap();
        }
        assert_eq!(one_by_one, full, "[{}] tile-by-tile", isa);
    }
}
