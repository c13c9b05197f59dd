//! Parallel entry points (spec §4.4.3, §4.4.4, §6 table): strip and
//! fine-grained blocked matmul, V1/V2 packed matmul over the worker
//! pool, batched V2 packed matmul, and the K-last parallel variant. Each
//! function here allocates its own per-worker scratch inside the
//! closure (spec §4.4.4 "Allocation is inside the worker's closure; no
//! cross-worker sharing"), except [`parallel_packed_matmul_v2`] and
//! [`batch_parallel_packed_matmul_v2`], which draw packed-A/packed-B
//! scratch from [`crate::buffer_pool`] to "avoid repeat allocation under
//! high call rates" (spec §4.4.4 alternate path).

use crate::blocked::block_mul_add;
use crate::buffer_pool::GlobalPools;
use crate::cache::{kernel_params, CacheParams};
use crate::error::{check_dims, Result};
use crate::gebp::{gebp_panel, packed_matmul, zero_output};
use crate::pack::{packed_lhs_len, packed_rhs_len, pack_lhs, pack_rhs};
use crate::pool::WorkerPool;
use crate::ptr::Ptr;
use crate::transpose::transpose2d;
use crate::types::Element;
use crate::workitem::generate_work_items;

/// `ParallelMatMul` (spec §4.4.3 "Strip parallelism", spec §6). Each
/// worker transposes nothing of its own: `A` is transposed once up
/// front, then `ParallelFor` hands out `ceil(M/RowsPerStrip)` horizontal
/// strips, each computed via [`block_mul_add`].
pub fn parallel_matmul<T: Element>(
    pool: &WorkerPool,
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
) -> Result<()> {
    check_dims("A", a.len(), m, k)?;
    check_dims("B", b.len(), k, n)?;
    check_dims("C", c.len(), m, n)?;

    zero_output(c, m, n);

    let mut a_t = vec![T::zero(); k * m];
    unsafe { transpose2d::<T>(a.as_ptr(), m, k, a_t.as_mut_ptr()) };

    let strip = crate::dispatch::ROWS_PER_STRIP;
    let n_strips = (m + strip - 1) / strip;

    let c_ptr = Ptr(c.as_mut_ptr());
    let a_t_ref = &a_t;

    pool.parallel_for(n_strips, move |s0, s1| {
        for s in s0..s1 {
            let row_start = s * strip;
            let row_end = (row_start + strip).min(m);
            let c_ptr = c_ptr;
            let c_slice = unsafe { core::slice::from_raw_parts_mut(c_ptr.0, m * n) };
            block_mul_add::<T>(a_t_ref, b, c_slice, m, n, k, row_start, row_end);
        }
    })?;
    Ok(())
}

/// `ParallelMatMulFineGrained` (spec §4.4.3 "Fine-grained 1-row"): each
/// worker claims one row index via `ParallelForAtomic` and computes that
/// single row of `C`, reusing the one shared transposed `A`.
pub fn parallel_matmul_fine_grained<T: Element>(
    pool: &WorkerPool,
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
) -> Result<()> {
    check_dims("A", a.len(), m, k)?;
    check_dims("B", b.len(), k, n)?;
    check_dims("C", c.len(), m, n)?;

    let c_ptr = Ptr(c.as_mut_ptr());
    pool.parallel_for_atomic(m, move |i| {
        let a_row = &a[i * k..i * k + k];
        let dst = unsafe { core::slice::from_raw_parts_mut(c_ptr.0.add(i * n), n) };
        // Per-worker `T::Acc` row scratch: accumulate the whole K-reduction
        // before rounding to `T`, instead of rounding on every step.
        let mut acc_row = vec![<T as num_traits::Zero>::zero().to_acc(); n];
        for p in 0..k {
            let av = a_row[p];
            if av == T::zero() {
                continue;
            }
            let b_row = &b[p * n..p * n + n];
            for j in 0..n {
                acc_row[j] = acc_row[j] + T::mul_acc(av, b_row[j]);
            }
        }
        for j in 0..n {
            dst[j] = T::from_acc(acc_row[j]);
        }
    })?;
    Ok(())
}

/// `ParallelPackedMatMul` (spec §6, "V1 strip"): `ParallelFor` hands out
/// row strips of `A`, each computed by the serial V1 GEBP path
/// ([`packed_matmul`]) against the whole of `B`, writing into its own
/// disjoint row range of `C`. Each worker packs its own scratch (spec
/// §4.4.4, default "allocation inside the worker's closure" path).
pub fn parallel_packed_matmul<T: Element>(
    pool: &WorkerPool,
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
) -> Result<()> {
    check_dims("A", a.len(), m, k)?;
    check_dims("B", b.len(), k, n)?;
    check_dims("C", c.len(), m, n)?;

    let strip = crate::dispatch::ROWS_PER_STRIP;
    let n_strips = (m + strip - 1) / strip;
    let c_ptr = Ptr(c.as_mut_ptr());

    pool.parallel_for(n_strips, move |s0, s1| {
        for s in s0..s1 {
            let row_start = s * strip;
            let row_end = (row_start + strip).min(m);
            let rows = row_end - row_start;
            if rows == 0 {
                continue;
            }
            let a_strip = &a[row_start * k..row_end * k];
            let c_strip = unsafe { core::slice::from_raw_parts_mut(c_ptr.0.add(row_start * n), rows * n) };
            let cache = kernel_params::<T>(T::LANES, core::mem::size_of::<T>()).expect("valid cache params");
            packed_matmul::<T>(a_strip, b, c_strip, rows, n, k, &cache).expect("dims already checked");
        }
    })?;
    Ok(())
}

/// One work item's share of V2 GEBP, writing into its own disjoint
/// `(lhs_row, rhs_col)` sub-rectangle of `C` (spec §4.4.2, §4.4.4). Draws
/// packed-A/packed-B scratch from the process-wide pools rather than
/// allocating per item (spec §4.4.4 alternate path).
fn run_packed_work_item<T: Element + GlobalPools>(
    a: &[T],
    b: &[T],
    c_ptr: Ptr<T>,
    m: usize,
    n: usize,
    k: usize,
    cache: &CacheParams,
    lhs_row_start: usize,
    lhs_row_end: usize,
    rhs_col_start: usize,
    rhs_col_end: usize,
) {
    let mr = cache.mr;
    let nr = cache.nr;
    let kc = cache.kc;
    let mc = cache.mc;
    let nc = cache.nc;

    let pools = T::global_pools();
    let mut packed_a = pools.transposed_a.get(packed_lhs_len(mr, mc, kc));
    let mut packed_b = pools.transposed_b.get(packed_rhs_len(nr, nc, kc));

    let rows = lhs_row_end - lhs_row_start;
    let cols = rhs_col_end - rhs_col_start;
    if rows == 0 || cols == 0 {
        return;
    }

    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    let mut jc = rhs_col_start;
    while jc < rhs_col_end {
        let n_chunk = nc.min(rhs_col_end - jc);

        let mut pc = 0;
        while pc < k {
            let k_chunk = kc.min(k - pc);

            unsafe {
                pack_rhs::<T>(nr, k_chunk, n_chunk, pc, jc, b_ptr, n, packed_b.as_mut_ptr());
            }

            let mut ic = lhs_row_start;
            while ic < lhs_row_end {
                let m_chunk = mc.min(lhs_row_end - ic);

                unsafe {
                    pack_lhs::<T>(mr, m_chunk, k_chunk, ic, pc, a_ptr, k, packed_a.as_mut_ptr());
                }

                unsafe {
                    gebp_panel::<T>(
                        packed_a.as_ptr(),
                        packed_b.as_ptr(),
                        c_ptr.0.add(ic * n + jc),
                        n as isize,
                        m_chunk,
                        n_chunk,
                        k_chunk,
                        mr,
                        nr,
                    );
                }

                ic += m_chunk;
            }
            pc += k_chunk;
        }
        jc += n_chunk;
    }
}

/// `ParallelPackedMatMulV2` (spec §4.4.2 + §4.4.4 + §6): generates work
/// items covering `1 x M x N` (no batch dimension), runs each through
/// `ParallelForAtomic` over the worker pool, each item packing its own
/// `(lhs_row, rhs_col)` sub-rectangle against the *whole* `K` extent of
/// `A`/`B` (so K-accumulation for one item stays fully sequential on one
/// worker, per spec §4.4.2 "K accumulation occurs strictly within a
/// single item").
pub fn parallel_packed_matmul_v2<T: Element + GlobalPools>(
    pool: &WorkerPool,
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
) -> Result<()> {
    check_dims("A", a.len(), m, k)?;
    check_dims("B", b.len(), k, n)?;
    check_dims("C", c.len(), m, n)?;

    zero_output(c, m, n);

    let cache = kernel_params::<T>(T::LANES, core::mem::size_of::<T>())?;
    let items = generate_work_items(1, m, n, &cache, pool.num_workers());
    let c_ptr = Ptr(c.as_mut_ptr());

    pool.parallel_for_atomic(items.len(), move |idx| {
        let it = items[idx];
        run_packed_work_item::<T>(
            a,
            b,
            c_ptr,
            m,
            n,
            k,
            &cache,
            it.lhs_row_start,
            it.lhs_row_end,
            it.rhs_col_start,
            it.rhs_col_end,
        );
    })?;
    Ok(())
}

/// `BatchParallelPackedMatMulV2` (spec §6): a batch of independent `M x
/// K` / `K x N` pairs sharing shape, each `C` slab `M x N`. Work items
/// are generated once over `(batch, M, N)` (spec §4.4.2 cases 1-2 apply
/// whenever `batchSize` is comparable to `maxWorkers`), then run over the
/// pool with each item resolving its own batch slice before packing.
pub fn batch_parallel_packed_matmul_v2<T: Element + GlobalPools>(
    pool: &WorkerPool,
    a: &[T],
    b: &[T],
    c: &mut [T],
    batch: usize,
    m: usize,
    n: usize,
    k: usize,
) -> Result<()> {
    check_dims("A", a.len(), batch * m, k)?;
    check_dims("B", b.len(), batch * k, n)?;
    check_dims("C", c.len(), batch * m, n)?;

    for v in &mut c[..batch * m * n] {
        *v = T::zero();
    }

    let cache = kernel_params::<T>(T::LANES, core::mem::size_of::<T>())?;
    let items = generate_work_items(batch, m, n, &cache, pool.num_workers());
    let c_ptr = Ptr(c.as_mut_ptr());

    pool.parallel_for_atomic(items.len(), move |idx| {
        let it = items[idx];
        for bi in it.batch_start..it.batch_end {
            let a_batch = &a[bi * m * k..bi * m * k + m * k];
            let b_batch = &b[bi * k * n..bi * k * n + k * n];
            let c_batch_ptr = Ptr(unsafe { c_ptr.0.add(bi * m * n) });
            run_packed_work_item::<T>(
                a_batch,
                b_batch,
                c_batch_ptr,
                m,
                n,
                k,
                &cache,
                it.lhs_row_start,
                it.lhs_row_end,
                it.rhs_col_start,
                it.rhs_col_end,
            );
        }
    })?;
    Ok(())
}

/// `ParallelMatMulKLast` (spec §6): `ParallelFor` row strips of the
/// blocked K-last kernel, each worker computing `rowEnd - rowStart` rows
/// of `C` against the whole of `B` (no shared transpose state needed,
/// spec §4.5 "streaming/blocked fallbacks need no transpose at all").
pub fn parallel_matmul_klast<T: Element>(
    pool: &WorkerPool,
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
) -> Result<()> {
    check_dims("A", a.len(), m, k)?;
    check_dims("B", b.len(), n, k)?;
    check_dims("C", c.len(), m, n)?;

    let strip = crate::dispatch::ROWS_PER_STRIP;
    let n_strips = (m + strip - 1) / strip;
    let c_ptr = Ptr(c.as_mut_ptr());

    pool.parallel_for(n_strips, move |s0, s1| {
        for s in s0..s1 {
            let row_start = s * strip;
            let row_end = (row_start + strip).min(m);
            let rows = row_end - row_start;
            if rows == 0 {
                continue;
            }
            let a_strip = &a[row_start * k..row_end * k];
            let c_strip = unsafe { core::slice::from_raw_parts_mut(c_ptr.0.add(row_start * n), rows * n) };
            crate::blocked::blocked_matmul_klast::<T>(a_strip, b, c_strip, rows, n, k).expect("dims already checked");
        }
    })?;
    Ok(())
}
