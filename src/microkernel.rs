//! Register-resident micro-kernel (spec §4.2 `PackedMicroKernel` /
//! `PackedMicroKernelPartial`) and the packed-output apply family
//! (`ApplyPackedOutput*`).
//!
//! The bodies here are the portable fallback: every `T` goes through the
//! same scalar-accumulator loop, unrolled ×4 over `K` with
//! [`seq_macro::seq!`] the way the teacher's `gemm_basic_generic`
//! unrolls its `do_work!` gemv loop. An ISA-specific collaborator
//! replaces these two function pointers after CPU feature detection
//! (spec §6); this module is what every dispatch table point falls back
//! to, and is what runs unconditionally under `HWY_NO_SIMD`.

use crate::types::Element;
use seq_macro::seq;

/// Computes an `mr x nr` tile as `sum_{p in 0..panel_k} a[p,:] outer b[p,:]`
/// and **accumulates into C** (`C += ...`).
///
/// `a` points at a packed-A micro-panel of shape `[panel_k, mr]`
/// (K-first), `b` at a packed-B micro-panel of shape `[panel_k, nr]`.
/// `c` points at the top-left of the destination tile; `c_row_stride` is
/// C's row stride in elements.
///
/// # Safety
/// `a` must be valid for `panel_k * mr` reads, `b` for `panel_k * nr`
/// reads, and `c` for `(mr-1)*c_row_stride + nr` writes reachable by the
/// tile's row/col strides.
#[inline]
pub unsafe fn packed_micro_kernel<T: Element>(
    mr: usize,
    nr: usize,
    panel_k: usize,
    a: *const T,
    b: *const T,
    c: *mut T,
    c_row_stride: isize,
) {
    // 8 logical accumulators in the canonical Mr=4 case map here to a
    // flat mr*nr accumulator buffer; K is unrolled x4 for ILP.
    let mut acc = vec![<T as num_traits::Zero>::zero().to_acc(); mr * nr];

    let mut p = 0usize;
    let unrolled = panel_k / 4 * 4;
    while p < unrolled {
        seq!(U in 0..4 {
            {
                let ap = a.add((p + U) * mr);
                let bp = b.add((p + U) * nr);
                for i in 0..mr {
                    let av = *ap.add(i);
                    for j in 0..nr {
                        let bv = *bp.add(j);
                        acc[i * nr + j] = acc[i * nr + j] + T::mul_acc(av, bv);
                    }
                }
            }
        });
        p += 4;
    }
    while p < panel_k {
        let ap = a.add(p * mr);
        let bp = b.add(p * nr);
        for i in 0..mr {
            let av = *ap.add(i);
            for j in 0..nr {
                let bv = *bp.add(j);
                acc[i * nr + j] = acc[i * nr + j] + T::mul_acc(av, bv);
            }
        }
        p += 1;
    }

    for i in 0..mr {
        let row = c.offset(i as isize * c_row_stride);
        for j in 0..nr {
            let dst = row.add(j);
            *dst = *dst + T::from_acc(acc[i * nr + j]);
        }
    }
}

/// Same contract as [`packed_micro_kernel`] with runtime
/// `active_rows <= mr`, `active_cols <= nr`: packed A/B are zero-padded
/// past the active region (packing zero-fills unused lanes), so the
/// dot-product sum is unaffected; only active rows/cols are written to
/// `c`.
///
/// # Safety
/// Same as [`packed_micro_kernel`], except only `active_rows` rows and
/// `active_cols` columns of `c` need be valid for writes.
#[inline]
pub unsafe fn packed_micro_kernel_partial<T: Element>(
    mr: usize,
    nr: usize,
    active_rows: usize,
    active_cols: usize,
    panel_k: usize,
    a: *const T,
    b: *const T,
    c: *mut T,
    c_row_stride: isize,
) {
    debug_assert!(active_rows <= mr);
    debug_assert!(active_cols <= nr);

    let mut acc = vec![<T as num_traits::Zero>::zero().to_acc(); active_rows * active_cols];
    for p in 0..panel_k {
        let ap = a.add(p * mr);
        let bp = b.add(p * nr);
        for i in 0..active_rows {
            let av = *ap.add(i);
            for j in 0..active_cols {
                let bv = *bp.add(j);
                acc[i * active_cols + j] = acc[i * active_cols + j] + T::mul_acc(av, bv);
            }
        }
    }

    for i in 0..active_rows {
        let row = c.offset(i as isize * c_row_stride);
        for j in 0..active_cols {
            let dst = row.add(j);
            *dst = *dst + T::from_acc(acc[i * active_cols + j]);
        }
    }
}

/// `C <- alpha*packed + beta*C` over the active `rows x cols` region.
/// `Simple`/`Accum` below are the `(1,0)`/`(1,1)` specializations the
/// spec calls out as 2-6x faster; this general form exists for
/// completeness and testing.
///
/// # Safety
/// `packed` must be valid for `rows * packed_row_stride` reads covering
/// the region; `c` similarly for writes via `c_row_stride`.
#[inline]
pub unsafe fn apply_packed_output<T: Element>(
    rows: usize,
    cols: usize,
    packed: *const T,
    packed_row_stride: usize,
    c: *mut T,
    c_row_stride: isize,
    alpha: T,
    beta: T,
) {
    for i in 0..rows {
        let src = packed.add(i * packed_row_stride);
        let dst = c.offset(i as isize * c_row_stride);
        for j in 0..cols {
            let old = *dst.add(j);
            *dst.add(j) = T::from_acc(T::mul_acc(alpha, *src.add(j)) + T::mul_acc(beta, old));
        }
    }
}

/// `C <- packed` (first K-pass; `alpha=1, beta=0`).
///
/// # Safety
/// Same as [`apply_packed_output`].
#[inline]
pub unsafe fn apply_packed_output_simple<T: Element>(
    rows: usize,
    cols: usize,
    packed: *const T,
    packed_row_stride: usize,
    c: *mut T,
    c_row_stride: isize,
) {
    for i in 0..rows {
        let src = packed.add(i * packed_row_stride);
        let dst = c.offset(i as isize * c_row_stride);
        core::ptr::copy_nonoverlapping(src, dst, cols);
    }
}

/// `C <- C + packed` (subsequent K-passes; `alpha=1, beta=1`).
///
/// # Safety
/// Same as [`apply_packed_output`].
#[inline]
pub unsafe fn apply_packed_output_accum<T: Element>(
    rows: usize,
    cols: usize,
    packed: *const T,
    packed_row_stride: usize,
    c: *mut T,
    c_row_stride: isize,
) {
    for i in 0..rows {
        let src = packed.add(i * packed_row_stride);
        let dst = c.offset(i as isize * c_row_stride);
        for j in 0..cols {
            *dst.add(j) = *dst.add(j) + *src.add(j);
        }
    }
}
