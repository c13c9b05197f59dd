//! Algorithm dispatcher (spec §4.1). The sole entry point a caller needs:
//! given element type, layout, shape, and optionally a pool, it picks one
//! of streaming / blocked / packed / hardware-outer-product and returns
//! having written `C`. Every threshold below is a fixed constant per spec
//! §4.1, not autotuned.

use crate::blocked::{blocked_matmul, blocked_matmul_klast};
use crate::cache::{kernel_params, CacheParams};
use crate::cpu_features::features;
use crate::error::Result;
use crate::gebp::packed_matmul_v2;
use crate::outer_product::{matmul_fmopa, OuterProductEngine, ReferenceEngine};
use crate::parallel::{
    parallel_matmul, parallel_matmul_fine_grained, parallel_matmul_klast, parallel_packed_matmul_v2,
};
use crate::pool::WorkerPool;
use crate::streaming::{streaming_matmul, streaming_matmul_klast};
use crate::types::Element;
use crate::buffer_pool::GlobalPools;

/// Below this operation count, streaming beats blocking (spec §4.1).
pub const SMALL_MATRIX_THRESHOLD: u64 = 64 * 64 * 64;
/// Above this operation count on x86, V2 packed with K-blocking wins.
pub const LARGE_MATRIX_THRESHOLD: u64 = 1024 * 1024 * 1024;
/// M below this, combined with large work, selects 1-row fine-grained.
pub const SMALL_M_THRESHOLD: usize = 64;
/// Below this operation count, a parallel call serializes instead.
pub const MIN_PARALLEL_OPS: u64 = 64 * 64 * 64;
/// Below this operation count, a packed call stays serial.
pub const MIN_PACKED_PARALLEL_OPS: u64 = 256 * 256 * 256;
/// Strip height for coarse row parallelism.
pub const ROWS_PER_STRIP: usize = 64;
/// K/N above this ratio: blocking reduces C traffic more than packing would.
pub const DEEP_K_RATIO: u64 = 4;

#[inline]
fn ops(m: usize, n: usize, k: usize) -> u64 {
    m as u64 * n as u64 * k as u64
}

/// `MatMul` (spec §6): serial, standard layout, lets the dispatcher pick
/// streaming vs. blocked vs. packed by shape. Never runs the
/// hardware-outer-product path (that requires an explicit engine; see
/// [`matmul_auto`]).
pub fn matmul<T: Element + GlobalPools>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) -> Result<()> {
    let n_ops = ops(m, n, k);
    if n_ops < SMALL_MATRIX_THRESHOLD {
        streaming_matmul::<T>(a, b, c, m, n, k)
    } else if n_ops < LARGE_MATRIX_THRESHOLD {
        blocked_matmul::<T>(a, b, c, m, n, k)
    } else {
        let cache = kernel_params::<T>(T::LANES, core::mem::size_of::<T>())?;
        packed_matmul_v2::<T>(a, b, c, m, n, k, &cache)
    }
}

/// `BlockedMatMul` (spec §6): always the blocked kernel, serial.
pub fn blocked_matmul_entry<T: Element>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) -> Result<()> {
    blocked_matmul::<T>(a, b, c, m, n, k)
}

/// `PackedMatMul` (spec §6): always the five-loop GEBP path (V2), serial.
pub fn packed_matmul_entry<T: Element>(
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
    cache: &CacheParams,
) -> Result<()> {
    packed_matmul_v2::<T>(a, b, c, m, n, k, cache)
}

/// `MatMulKLast` / `MatMulKLastBlocked` (spec §6): serial K-last, always
/// the blocked K-last kernel (streaming K-last is reachable directly via
/// [`crate::streaming::streaming_matmul_klast`] for callers who want the
/// small-shape kernel explicitly).
pub fn matmul_klast_blocked<T: Element>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) -> Result<()> {
    blocked_matmul_klast::<T>(a, b, c, m, n, k)
}

/// `MatMulAuto` (spec §6, spec §4.1 selection rules 1-4, standard
/// layout). The full dispatcher: fine-grained / streaming / blocked /
/// packed-or-outer-product by shape, parallel over `pool` once work is
/// large enough to be worth splitting (spec §4.1 + `MinParallelOps`/
/// `MinPackedParallelOps`).
pub fn matmul_auto<T: Element + GlobalPools>(
    pool: &WorkerPool,
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
) -> Result<()> {
    let n_ops = ops(m, n, k);

    // Rule 1: small M with large work -> fine-grained 1-row parallel.
    if m < SMALL_M_THRESHOLD && n_ops >= SMALL_MATRIX_THRESHOLD {
        tracing::debug!(m, n, k, n_ops, "dispatch: fine-grained 1-row (rule 1)");
        return parallel_matmul_fine_grained::<T>(pool, a, b, c, m, n, k);
    }

    // Rule 2: small overall work -> streaming.
    if n_ops < SMALL_MATRIX_THRESHOLD {
        tracing::debug!(m, n, k, n_ops, "dispatch: streaming (rule 2)");
        return streaming_matmul::<T>(a, b, c, m, n, k);
    }

    // Rule 3: medium work -> parallel blocked with RowsPerStrip strips.
    if n_ops < LARGE_MATRIX_THRESHOLD {
        tracing::debug!(m, n, k, n_ops, "dispatch: parallel blocked strips (rule 3)");
        if n_ops < MIN_PARALLEL_OPS {
            return blocked_matmul::<T>(a, b, c, m, n, k);
        }
        return parallel_matmul::<T>(pool, a, b, c, m, n, k);
    }

    // Rule 4: large work -> hardware outer-product if available, else V2 packed.
    let feats = features();
    if feats.has_outer_product_engine() {
        tracing::debug!(m, n, k, n_ops, "dispatch: parallel blocked over outer-product engine (rule 4a)");
        let engine = ReferenceEngine { tile: 16 };
        return matmul_fmopa::<T, _>(&engine, a, b, c, m, n, k);
    }

    tracing::debug!(m, n, k, n_ops, "dispatch: V2 packed with K-blocking (rule 4b)");
    if n_ops < MIN_PACKED_PARALLEL_OPS {
        let cache = kernel_params::<T>(T::LANES, core::mem::size_of::<T>())?;
        return packed_matmul_v2::<T>(a, b, c, m, n, k, &cache);
    }
    parallel_packed_matmul_v2::<T>(pool, a, b, c, m, n, k)
}

/// `MatMulKLastAuto` (spec §6, spec §4.1 K-last selection rules).
pub fn matmul_klast_auto<T: Element + GlobalPools>(
    pool: &WorkerPool,
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
) -> Result<()> {
    let n_ops = ops(m, n, k);

    if m < SMALL_M_THRESHOLD && n_ops >= SMALL_MATRIX_THRESHOLD {
        tracing::debug!(m, n, k, n_ops, "dispatch(klast): fine-grained 1-row (rule 1)");
        return parallel_matmul_klast_fine_grained::<T>(pool, a, b, c, m, n, k);
    }

    if n_ops < SMALL_MATRIX_THRESHOLD {
        tracing::debug!(m, n, k, n_ops, "dispatch(klast): streaming (rule 2)");
        return streaming_matmul_klast::<T>(a, b, c, m, n, k);
    }

    tracing::debug!(m, n, k, n_ops, "dispatch(klast): parallel blocked (rule 3)");
    if n_ops < MIN_PARALLEL_OPS {
        return blocked_matmul_klast::<T>(a, b, c, m, n, k);
    }
    parallel_matmul_klast::<T>(pool, a, b, c, m, n, k)
}

/// Fine-grained 1-row K-last parallel: each worker claims one row of A
/// and computes one row of C against all of B (spec §4.4.3, K-last
/// analogue of [`parallel_matmul_fine_grained`]).
fn parallel_matmul_klast_fine_grained<T: Element>(
    pool: &WorkerPool,
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
) -> Result<()> {
    crate::error::check_dims("A", a.len(), m, k)?;
    crate::error::check_dims("B", b.len(), n, k)?;
    crate::error::check_dims("C", c.len(), m, n)?;

    let c_ptr = crate::ptr::Ptr(c.as_mut_ptr());
    pool.parallel_for_atomic(m, move |i| {
        let c_ptr = c_ptr;
        let a_row = &a[i * k..i * k + k];
        for j in 0..n {
            let b_row = &b[j * k..j * k + k];
            let mut acc = <T as num_traits::Zero>::zero().to_acc();
            for p in 0..k {
                acc = acc + T::mul_acc(a_row[p], b_row[p]);
            }
            unsafe {
                *c_ptr.0.add(i * n + j) = T::from_acc(acc);
            }
        }
    })?;
    Ok(())
}

/// `DeepKRatio`-gated hint: true when K/N exceeds the ratio at which
/// blocking reduces C traffic more than packing would (spec §4.1). Not
/// used by the selection rules above (those are shape-threshold only,
/// per spec), but exposed for a caller building a custom dispatch policy
/// on top of `BlockedMatMul`/`PackedMatMul`.
pub fn prefers_blocking_over_packing(n: usize, k: usize) -> bool {
    n == 0 || k as u64 / (n as u64).max(1) >= DEEP_K_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn matmul_picks_correct_tier_across_boundaries() {
        for &(m, n, k) in &[(4, 4, 4), (40, 40, 40), (200, 200, 200)] {
            let a: Vec<f32> = (0..m * k).map(|i| ((i % 7) as f32) * 0.1 - 0.3).collect();
            let b: Vec<f32> = (0..k * n).map(|i| ((i % 5) as f32) * 0.1 - 0.2).collect();
            let expected = reference(&a, &b, m, n, k);

            let mut c = vec![0f32; m * n];
            matmul::<f32>(&a, &b, &mut c, m, n, k).unwrap();

            let tol = 1e-3 * k as f32;
            for (got, want) in c.iter().zip(expected.iter()) {
                assert!((got - want).abs() <= tol, "shape ({m},{n},{k}): {got} vs {want}");
            }
        }
    }

    #[test]
    fn matmul_auto_agrees_with_serial_matmul_on_medium_shapes() {
        let pool = WorkerPool::new(4).unwrap();
        let (m, n, k) = (96, 80, 70);
        let a: Vec<f32> = (0..m * k).map(|i| ((i % 11) as f32) * 0.05 - 0.2).collect();
        let b: Vec<f32> = (0..k * n).map(|i| ((i % 9) as f32) * 0.05 - 0.25).collect();

        let mut c_serial = vec![0f32; m * n];
        matmul::<f32>(&a, &b, &mut c_serial, m, n, k).unwrap();

        let mut c_auto = vec![0f32; m * n];
        matmul_auto::<f32>(&pool, &a, &b, &mut c_auto, m, n, k).unwrap();

        for (s, p) in c_serial.iter().zip(c_auto.iter()) {
            assert!((s - p).abs() <= 1e-2, "{} vs {}", s, p);
        }
    }

    #[test]
    fn klast_auto_agrees_with_serial_klast_blocked() {
        let pool = WorkerPool::new(4).unwrap();
        let (m, n, k) = (96, 70, 80);
        let a: Vec<f32> = (0..m * k).map(|i| ((i % 13) as f32) * 0.05 - 0.3).collect();
        let b: Vec<f32> = (0..n * k).map(|i| ((i % 7) as f32) * 0.05 - 0.2).collect();

        let mut c_serial = vec![0f32; m * n];
        matmul_klast_blocked::<f32>(&a, &b, &mut c_serial, m, n, k).unwrap();

        let mut c_auto = vec![0f32; m * n];
        matmul_klast_auto::<f32>(&pool, &a, &b, &mut c_auto, m, n, k).unwrap();

        for (s, p) in c_serial.iter().zip(c_auto.iter()) {
            assert!((s - p).abs() <= 1e-2, "{} vs {}", s, p);
        }
    }

    #[test]
    fn small_m_large_work_routes_to_fine_grained_rule() {
        // M is tiny but N*K is large: rule 1 should fire without error.
        let pool = WorkerPool::new(2).unwrap();
        let (m, n, k) = (2, 300, 300);
        let a: Vec<f32> = (0..m * k).map(|i| i as f32 * 0.01).collect();
        let b: Vec<f32> = (0..k * n).map(|i| i as f32 * 0.01).collect();
        let mut c = vec![0f32; m * n];
        matmul_auto::<f32>(&pool, &a, &b, &mut c, m, n, k).unwrap();
        let expected = reference(&a, &b, m, n, k);
        let tol = 1e-1;
        for (got, want) in c.iter().zip(expected.iter()) {
            assert!((got - want).abs() <= tol);
        }
    }
}
