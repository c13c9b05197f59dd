//! Property-based coverage of spec §8's quantified invariants, over
//! randomly generated shapes and values rather than the fixed shapes in
//! `end_to_end.rs`.

use gemm_core::{matmul, matmul_auto, matmul_klast_blocked, WorkerPool};
use proptest::prelude::*;

fn reference(a: &[f32], b: &[f32], m: usize, n: usize, k: usize) -> Vec<f32> {
    let mut c = vec![0f32; m * n];
    for i in 0..m {
        for p in 0..k {
            let av = a[i * k + p];
            for j in 0..n {
                c[i * n + j] += av * b[p * n + j];
            }
        }
    }
    c
}

fn reference_klast(a: &[f32], b: &[f32], m: usize, n: usize, k: usize) -> Vec<f32> {
    let mut c = vec![0f32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0f32;
            for p in 0..k {
                acc += a[i * k + p] * b[j * k + p];
            }
            c[i * n + j] = acc;
        }
    }
    c
}

proptest! {
    /// Property 1 (functional equivalence) across random shapes spanning
    /// the streaming/blocked tier boundary.
    #[test]
    fn matmul_matches_reference_for_random_small_to_medium_shapes(
        m in 1usize..20,
        n in 1usize..20,
        k in 1usize..20,
        seed in any::<u64>(),
    ) {
        let a: Vec<f32> = (0..m * k).map(|i| (((seed.wrapping_add(i as u64)) % 2000) as f32 / 1000.0 - 1.0)).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (((seed.wrapping_mul(7).wrapping_add(i as u64)) % 2000) as f32 / 1000.0 - 1.0)).collect();
        let expected = reference(&a, &b, m, n, k);

        let mut c = vec![0f32; m * n];
        matmul::<f32>(&a, &b, &mut c, m, n, k).unwrap();

        let tol = 1e-3 * k as f32 + 1e-4;
        for (got, want) in c.iter().zip(expected.iter()) {
            prop_assert!((got - want).abs() <= tol, "{} vs {}", got, want);
        }
    }

    /// Property 2 (zeroing): pre-existing garbage in C never leaks into
    /// the result, across random shapes and random garbage fill.
    #[test]
    fn preexisting_c_garbage_never_affects_output(
        m in 1usize..16,
        n in 1usize..16,
        k in 1usize..16,
        garbage in -1e6f32..1e6f32,
    ) {
        let a: Vec<f32> = (0..m * k).map(|i| (i % 5) as f32 - 2.0).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (i % 3) as f32 - 1.0).collect();

        let mut c_clean = vec![0f32; m * n];
        matmul::<f32>(&a, &b, &mut c_clean, m, n, k).unwrap();

        let mut c_dirty = vec![garbage; m * n];
        matmul::<f32>(&a, &b, &mut c_dirty, m, n, k).unwrap();

        prop_assert_eq!(c_clean, c_dirty);
    }

    /// Property 9 (K-last equivalence) over random shapes: K-last matches
    /// standard matmul against the explicitly transposed B.
    #[test]
    fn klast_matches_standard_with_explicit_transpose_random(
        m in 1usize..16,
        n in 1usize..16,
        k in 1usize..16,
        seed in any::<u64>(),
    ) {
        let a: Vec<f32> = (0..m * k).map(|i| (((seed.wrapping_add(i as u64)) % 1000) as f32 / 500.0 - 1.0)).collect();
        let b_klast: Vec<f32> = (0..n * k).map(|i| (((seed.wrapping_mul(3).wrapping_add(i as u64)) % 1000) as f32 / 500.0 - 1.0)).collect();
        let expected = reference_klast(&a, &b_klast, m, n, k);

        let mut c = vec![0f32; m * n];
        matmul_klast_blocked::<f32>(&a, &b_klast, &mut c, m, n, k).unwrap();

        let tol = 1e-3 * k as f32 + 1e-4;
        for (got, want) in c.iter().zip(expected.iter()) {
            prop_assert!((got - want).abs() <= tol, "{} vs {}", got, want);
        }
    }

    /// Property 10 (determinism): two calls on the same pool with the
    /// same input agree bitwise, across random medium-sized shapes.
    #[test]
    fn matmul_auto_is_deterministic_across_random_shapes(
        m in 20usize..90,
        n in 20usize..90,
        k in 20usize..90,
        seed in any::<u64>(),
    ) {
        let pool = WorkerPool::new(3).unwrap();
        let a: Vec<f32> = (0..m * k).map(|i| (((seed.wrapping_add(i as u64)) % 2000) as f32 / 1000.0 - 1.0)).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (((seed.wrapping_mul(11).wrapping_add(i as u64)) % 2000) as f32 / 1000.0 - 1.0)).collect();

        let mut c1 = vec![0f32; m * n];
        let mut c2 = vec![0f32; m * n];
        matmul_auto::<f32>(&pool, &a, &b, &mut c1, m, n, k).unwrap();
        matmul_auto::<f32>(&pool, &a, &b, &mut c2, m, n, k).unwrap();

        prop_assert_eq!(c1, c2);
    }
}
