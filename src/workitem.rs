//! Work-item generation (spec §4.4.2).
//!
//! Splits `batch x M x N` into items whose union covers the whole output
//! exactly once, aligned to `(Mc, Nc)` where the split is finer than the
//! whole matrix (spec §3 "Work item").

use crate::cache::CacheParams;

/// `(batch_start, batch_end, lhs_row_start, lhs_row_end, rhs_col_start,
/// rhs_col_end)` — spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub batch_start: usize,
    pub batch_end: usize,
    pub lhs_row_start: usize,
    pub lhs_row_end: usize,
    pub rhs_col_start: usize,
    pub rhs_col_end: usize,
}

fn div_ceil(a: usize, b: usize) -> usize {
    if b == 0 {
        0
    } else {
        (a + b - 1) / b
    }
}

/// Generates work items for `batch_size x lhs_cross_size(M) x
/// rhs_cross_size(N)` over `max_workers` workers, following spec
/// §4.4.2's three-case algorithm.
pub fn generate_work_items(
    batch_size: usize,
    lhs_cross_size: usize,
    rhs_cross_size: usize,
    cache: &CacheParams,
    max_workers: usize,
) -> Vec<WorkItem> {
    let max_workers = max_workers.max(1);
    let m = lhs_cross_size;
    let n = rhs_cross_size;

    if batch_size == 0 || m == 0 || n == 0 {
        return Vec::new();
    }

    let mut items = Vec::new();

    if batch_size >= 2 * max_workers {
        // Case 1: split only on batch.
        let step = (batch_size / max_workers).max(1);
        let mut start = 0;
        while start < batch_size {
            let end = (start + step).min(batch_size);
            items.push(WorkItem {
                batch_start: start,
                batch_end: end,
                lhs_row_start: 0,
                lhs_row_end: m,
                rhs_col_start: 0,
                rhs_col_end: n,
            });
            start = end;
        }
        return items;
    }

    let mut emitted_batches = 0;
    if batch_size >= max_workers {
        // Case 2: one whole-(M,N) item per batch for the first max_workers batches.
        for b in 0..max_workers {
            items.push(WorkItem {
                batch_start: b,
                batch_end: b + 1,
                lhs_row_start: 0,
                lhs_row_end: m,
                rhs_col_start: 0,
                rhs_col_end: n,
            });
        }
        emitted_batches = max_workers;
    }

    // Case 3: split the larger of M/N across the remaining batches.
    let remaining = batch_size - emitted_batches;
    if remaining == 0 {
        return items;
    }
    let split_factor = div_ceil(max_workers, remaining).max(1);

    let split_on_m = m >= n;
    let (chunk, hi) = if split_on_m {
        let raw = div_ceil(m, split_factor);
        let aligned = (raw / cache.mc).max(1) * cache.mc;
        (aligned, m)
    } else {
        let raw = div_ceil(n, split_factor);
        let aligned = (raw / cache.nc).max(1) * cache.nc;
        (aligned, n)
    };

    for b in emitted_batches..batch_size {
        let mut start = 0;
        while start < hi {
            let end = (start + chunk).min(hi);
            if split_on_m {
                items.push(WorkItem {
                    batch_start: b,
                    batch_end: b + 1,
                    lhs_row_start: start,
                    lhs_row_end: end,
                    rhs_col_start: 0,
                    rhs_col_end: n,
                });
            } else {
                items.push(WorkItem {
                    batch_start: b,
                    batch_end: b + 1,
                    lhs_row_start: 0,
                    lhs_row_end: m,
                    rhs_col_start: start,
                    rhs_col_end: end,
                });
            }
            start = end;
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::kernel_params;

    /// Spec §8 property 7: union of output ranges equals
    /// `{0..batch} x {0..M} x {0..N}` with no overlap.
    fn assert_coverage(items: &[WorkItem], batch: usize, m: usize, n: usize) {
        let mut covered = vec![0u8; batch * m * n];
        for it in items {
            for b in it.batch_start..it.batch_end {
                for i in it.lhs_row_start..it.lhs_row_end {
                    for j in it.rhs_col_start..it.rhs_col_end {
                        let idx = b * m * n + i * n + j;
                        assert_eq!(covered[idx], 0, "overlap at b={b} i={i} j={j}");
                        covered[idx] = 1;
                    }
                }
            }
        }
        assert!(covered.iter().all(|&c| c == 1), "not fully covered");
    }

    #[test]
    fn case1_batch_much_larger_than_workers() {
        let cache = kernel_params::<f32>(8, 4).unwrap();
        let items = generate_work_items(64, 32, 32, &cache, 8);
        assert_coverage(&items, 64, 32, 32);
        for it in &items {
            assert_eq!(it.lhs_row_start, 0);
            assert_eq!(it.lhs_row_end, 32);
        }
    }

    #[test]
    fn case2_batch_between_workers_and_twice_workers() {
        let cache = kernel_params::<f32>(8, 4).unwrap();
        let items = generate_work_items(6, 100, 50, &cache, 4);
        assert_coverage(&items, 6, 100, 50);
    }

    #[test]
    fn case3_single_batch_splits_largest_dim() {
        let cache = kernel_params::<f32>(8, 4).unwrap();
        let items = generate_work_items(1, 4096, 128, &cache, 8);
        assert_coverage(&items, 1, 4096, 128);
        assert!(items.len() > 1);
        for it in &items {
            assert_eq!(it.rhs_col_start, 0);
            assert_eq!(it.rhs_col_end, 128);
        }
    }

    #[test]
    fn no_batch_falls_through_to_case3_on_narrow_matrices() {
        let cache = kernel_params::<f32>(8, 4).unwrap();
        let items = generate_work_items(2, 33, 33, &cache, 8);
        assert_coverage(&items, 2, 33, 33);
    }

    #[test]
    fn single_worker_yields_whole_matrix() {
        let cache = kernel_params::<f32>(8, 4).unwrap();
        let items = generate_work_items(1, 17, 17, &cache, 1);
        assert_coverage(&items, 1, 17, 17);
    }
}
