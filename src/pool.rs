//! Persistent worker pool (spec §4.4.1).
//!
//! Realized over a dedicated `rayon::ThreadPool` (rather than the global
//! rayon pool) so a process can hold several independently-sized pools,
//! matching spec §3's "the worker pool is process-wide, created once,
//! shut down on teardown". `ParallelFor`/`ParallelForAtomic` are built on
//! `pool.install(..)` + `rayon::scope`, which gives the "submitting
//! context blocks until all workers complete" barrier semantics of spec
//! §4.4.1 for free.

use crate::error::{GemmError, Result};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    num_workers: usize,
    closed: AtomicBool,
}

impl WorkerPool {
    /// Creates a pool with `num_workers` threads. `num_workers == 0` is
    /// treated as "use reported CPU parallelism" (spec §4.4.1 default).
    pub fn new(num_workers: usize) -> Result<WorkerPool> {
        let num_workers = if num_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            num_workers
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|i| format!("gemm-core-worker-{i}"))
            .build()
            .map_err(|_| GemmError::HardwareUnavailable {
                path: "worker pool thread spawn",
            })?;

        Ok(WorkerPool {
            pool,
            num_workers,
            closed: AtomicBool::new(false),
        })
    }

    /// Process-wide default pool, sized from `GEMM_NUM_THREADS` if set
    /// (mirroring `RAYON_NUM_THREADS`), else reported CPU parallelism.
    /// Resolves the "drop the ad-hoc-pool variant" open question (spec
    /// §9): callers who don't construct their own pool still get one.
    pub fn global() -> &'static WorkerPool {
        static GLOBAL: OnceCell<WorkerPool> = OnceCell::new();
        GLOBAL.get_or_init(|| {
            let n = std::env::var("GEMM_NUM_THREADS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            WorkerPool::new(n).expect("failed to create default worker pool")
        })
    }

    #[inline]
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(GemmError::WorkerPoolClosed)
        } else {
            Ok(())
        }
    }

    /// Usable worker count (spec §4.4.1 `NumWorkers`).
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// May be 1 for single-core, or lower than `num_workers` if the
    /// caller wants to cap parallelism for a small job (spec §4.4.1
    /// `AdjustedMaxParallelism`).
    #[inline]
    pub fn adjusted_max_parallelism(&self, desired_cap: usize) -> usize {
        if desired_cap == 0 {
            self.num_workers
        } else {
            self.num_workers.min(desired_cap)
        }
    }

    /// Partitions `0..n_items` into contiguous ranges across workers and
    /// calls `f(start, end)` once per range.
    pub fn parallel_for(&self, n_items: usize, f: impl Fn(usize, usize) + Sync) -> Result<()> {
        self.ensure_open()?;
        if n_items == 0 {
            return Ok(());
        }
        let workers = self.num_workers.min(n_items).max(1);
        let chunk = (n_items + workers - 1) / workers;

        self.pool.install(|| {
            rayon::scope(|s| {
                let mut start = 0;
                while start < n_items {
                    let end = (start + chunk).min(n_items);
                    let f = &f;
                    s.spawn(move |_| f(start, end));
                    start = end;
                }
            });
        });
        Ok(())
    }

    /// Atomic-counter work stealing: each worker repeatedly
    /// fetch-and-increments a shared counter and invokes `f` on the
    /// claimed index until `n_items` is exhausted.
    pub fn parallel_for_atomic(&self, n_items: usize, f: impl Fn(usize) + Sync) -> Result<()> {
        self.ensure_open()?;
        if n_items == 0 {
            return Ok(());
        }
        let counter = AtomicUsize::new(0);
        let workers = self.num_workers.min(n_items).max(1);

        self.pool.install(|| {
            rayon::scope(|s| {
                for _ in 0..workers {
                    let counter = &counter;
                    let f = &f;
                    s.spawn(move |_| loop {
                        let idx = counter.fetch_add(1, Ordering::Relaxed);
                        if idx >= n_items {
                            return;
                        }
                        f(idx);
                    });
                }
            });
        });
        Ok(())
    }

    /// Runs `f(worker_index)` once on every worker (spec §4.4.1
    /// `Saturate`, used for channel-drain patterns).
    pub fn saturate(&self, f: impl Fn(usize) + Sync) -> Result<()> {
        self.ensure_open()?;
        let workers = self.num_workers;
        self.pool.install(|| {
            rayon::scope(|s| {
                for w in 0..workers {
                    let f = &f;
                    s.spawn(move |_| f(w));
                }
            });
        });
        Ok(())
    }

    /// Drain, join, release. Subsequent calls return `WorkerPoolClosed`.
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn parallel_for_covers_every_item_once() {
        let pool = WorkerPool::new(4).unwrap();
        let n = 997;
        let seen = (0..n).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>();
        pool.parallel_for(n, |start, end| {
            for i in start..end {
                seen[i].fetch_add(1, Ordering::Relaxed);
            }
        })
        .unwrap();
        assert!(seen.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn parallel_for_atomic_covers_every_item_once() {
        let pool = WorkerPool::new(4).unwrap();
        let n = 1000;
        let seen = (0..n).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>();
        pool.parallel_for_atomic(n, |i| {
            seen[i].fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        assert!(seen.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn closed_pool_rejects_work() {
        let pool = WorkerPool::new(2).unwrap();
        pool.close().unwrap();
        assert!(matches!(
            pool.parallel_for(10, |_, _| {}),
            Err(GemmError::WorkerPoolClosed)
        ));
    }

    #[test]
    fn fresh_pool_and_serviced_pool_agree() {
        let fresh = WorkerPool::new(2).unwrap();
        let serviced = WorkerPool::new(2).unwrap();
        serviced.parallel_for(500, |_, _| {}).unwrap();

        let n = 200;
        let a: Vec<i64> = (0..n).collect();
        let run = |pool: &WorkerPool| -> Vec<i64> {
            let out: Vec<_> = (0..n).map(|_| AtomicUsize::new(0)).collect();
            pool.parallel_for_atomic(n as usize, |i| {
                out[i].store(a[i] as usize * 2, Ordering::Relaxed);
            })
            .unwrap();
            out.iter().map(|v| v.load(Ordering::Relaxed) as i64).collect()
        };

        assert_eq!(run(&fresh), run(&serviced));
    }
}
