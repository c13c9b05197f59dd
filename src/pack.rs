//! LHS/RHS panel packing (spec §4.2 `PackLHS` / `PackRHS` / `PackRHSFast`,
//! §3 "Packed A" / "Packed B").
//!
//! Grounded on the teacher's own packing call sites in `gemm.rs`
//! (`pack_lhs::<T, MR>(..)`, `pack_rhs::<T, NR>(..)`), generalized from a
//! const-generic `MR`/`NR` to runtime values driven by
//! [`crate::cache::CacheParams`], since cache params are chosen once per
//! `(Isa, T)` at runtime here rather than selected by a macro-generated
//! per-ISA module.

use crate::types::Element;

/// Packs `A[row_start..row_start+panel_rows, col_start..col_start+panel_k]`
/// from an `M x K` row-major matrix into micro-panels of shape
/// `[ceil(panel_rows/mr), panel_k, mr]`, K-first within each micro-panel.
/// The last micro-panel is zero-padded to `mr` rows if `panel_rows` is not
/// a multiple of `mr`.
///
/// Returns the active row count of the last micro-panel (for downstream
/// tail-tile selection).
///
/// # Safety
/// `a` must be a valid pointer to an `a_rows x a_cols` row-major matrix
/// (row stride `a_cols`) covering the requested `row_start/col_start`
/// window; `out` must have room for
/// `ceil(panel_rows/mr) * panel_k * mr` elements of `T`.
pub unsafe fn pack_lhs<T: Element>(
    mr: usize,
    panel_rows: usize,
    panel_k: usize,
    row_start: usize,
    col_start: usize,
    a: *const T,
    a_cols: usize,
    out: *mut T,
) -> usize {
    let n_panels = (panel_rows + mr - 1) / mr;
    let mut active_last = mr;

    for panel in 0..n_panels {
        let row0 = row_start + panel * mr;
        let rows_here = (panel_rows - panel * mr).min(mr);
        if panel + 1 == n_panels {
            active_last = rows_here;
        }
        let panel_out = out.add(panel * panel_k * mr);
        for p in 0..panel_k {
            let dst = panel_out.add(p * mr);
            let src_row_base = a.add((row0) * a_cols + col_start + p);
            for r in 0..rows_here {
                *dst.add(r) = *src_row_base.add(r * a_cols);
            }
            for r in rows_here..mr {
                *dst.add(r) = <T as num_traits::Zero>::zero();
            }
        }
    }
    active_last
}

/// Packs `B[row_start..row_start+panel_k, col_start..col_start+panel_cols]`
/// from a `K x N` row-major matrix into micro-panels of shape
/// `[ceil(panel_cols/nr), panel_k, nr]`, K-first within each micro-panel,
/// zero-padded on the last partial micro-panel. Symmetric to
/// [`pack_lhs`]; returns the active column count of the last micro-panel.
///
/// # Safety
/// Same contract as [`pack_lhs`], mirrored for `B`'s `K x N` shape.
pub unsafe fn pack_rhs<T: Element>(
    nr: usize,
    panel_k: usize,
    panel_cols: usize,
    row_start: usize,
    col_start: usize,
    b: *const T,
    b_cols: usize,
    out: *mut T,
) -> usize {
    let n_panels = (panel_cols + nr - 1) / nr;
    let mut active_last = nr;

    for panel in 0..n_panels {
        let col0 = col_start + panel * nr;
        let cols_here = (panel_cols - panel * nr).min(nr);
        if panel + 1 == n_panels {
            active_last = cols_here;
        }
        let panel_out = out.add(panel * panel_k * nr);
        for p in 0..panel_k {
            let dst = panel_out.add(p * nr);
            let src_row = b.add((row_start + p) * b_cols + col0);
            for c in 0..cols_here {
                *dst.add(c) = *src_row.add(c);
            }
            for c in cols_here..nr {
                *dst.add(c) = <T as num_traits::Zero>::zero();
            }
        }
    }
    active_last
}

/// Vectorized variant of [`pack_rhs`] used when `nr >= lanes` and
/// `nr % lanes == 0`: full-width micro-panels are copied with SIMD
/// load/store (here, the portable [`crate::simd::Scalar`] lane, since the
/// real vector width is an out-of-scope ISA collaborator); falls back to
/// the scalar zero-filling copy of [`pack_rhs`] for the partial last
/// micro-panel.
///
/// # Safety
/// Same contract as [`pack_rhs`].
pub unsafe fn pack_rhs_fast<T: Element>(
    nr: usize,
    lanes: usize,
    panel_k: usize,
    panel_cols: usize,
    row_start: usize,
    col_start: usize,
    b: *const T,
    b_cols: usize,
    out: *mut T,
) -> usize {
    use crate::simd::{Scalar, Simd};

    if lanes == 0 || nr % lanes != 0 {
        return pack_rhs::<T>(nr, panel_k, panel_cols, row_start, col_start, b, b_cols, out);
    }

    let n_panels = (panel_cols + nr - 1) / nr;
    let mut active_last = nr;

    for panel in 0..n_panels {
        let col0 = col_start + panel * nr;
        let cols_here = (panel_cols - panel * nr).min(nr);
        let panel_out = out.add(panel * panel_k * nr);

        if cols_here == nr {
            // Full micro-panel: vector load/store over the whole width, no
            // zero-fill tail needed. `Scalar`'s `LANES == 1` here, but a
            // real ISA `Simd` impl plugged in at this same call site widens
            // the step without touching this loop.
            for p in 0..panel_k {
                let dst = panel_out.add(p * nr);
                let src_row = b.add((row_start + p) * b_cols + col0);
                let mut c = 0;
                while c < nr {
                    let v = Scalar::<T>::load(src_row.add(c));
                    v.store(dst.add(c));
                    c += Scalar::<T>::LANES;
                }
            }
        } else {
            // Partial last panel: scalar zero-filling copy, same as `pack_rhs`.
            active_last = cols_here;
            for p in 0..panel_k {
                let dst = panel_out.add(p * nr);
                let src_row = b.add((row_start + p) * b_cols + col0);
                for c in 0..cols_here {
                    *dst.add(c) = *src_row.add(c);
                }
                for c in cols_here..nr {
                    *dst.add(c) = <T as num_traits::Zero>::zero();
                }
            }
        }
    }

    active_last
}

/// Unpacks a packed-A panel of `rows x cols` back to a dense row-major
/// buffer, used only by the packing round-trip test (spec §8 property 3).
///
/// # Safety
/// `packed` must hold `ceil(rows/mr) * k * mr` valid elements; `out` must
/// have room for `rows * k`.
pub unsafe fn unpack_lhs<T: Element>(mr: usize, rows: usize, k: usize, packed: *const T, out: *mut T) {
    let n_panels = (rows + mr - 1) / mr;
    for panel in 0..n_panels {
        let row0 = panel * mr;
        let rows_here = (rows - row0).min(mr);
        let panel_in = packed.add(panel * k * mr);
        for p in 0..k {
            let src = panel_in.add(p * mr);
            for r in 0..rows_here {
                *out.add((row0 + r) * k + p) = *src.add(r);
            }
        }
    }
}

/// Unpacks a packed-B panel, symmetric to [`unpack_lhs`].
///
/// # Safety
/// Same contract as [`unpack_lhs`] mirrored for B's `k x cols` shape.
pub unsafe fn unpack_rhs<T: Element>(nr: usize, cols: usize, k: usize, packed: *const T, out: *mut T) {
    let n_panels = (cols + nr - 1) / nr;
    for panel in 0..n_panels {
        let col0 = panel * nr;
        let cols_here = (cols - col0).min(nr);
        let panel_in = packed.add(panel * k * nr);
        for p in 0..k {
            let src = panel_in.add(p * nr);
            for c in 0..cols_here {
                *out.add(p * cols + col0 + c) = *src.add(c);
            }
        }
    }
}

/// Packed-A buffer size in elements for `panel_rows` rows, `panel_k` depth.
#[inline]
pub fn packed_lhs_len(mr: usize, panel_rows: usize, panel_k: usize) -> usize {
    let n_panels = (panel_rows + mr - 1) / mr;
    n_panels * panel_k * mr
}

/// Packed-B buffer size in elements for `panel_cols` cols, `panel_k` depth.
#[inline]
pub fn packed_rhs_len(nr: usize, panel_cols: usize, panel_k: usize) -> usize {
    let n_panels = (panel_cols + nr - 1) / nr;
    n_panels * panel_k * nr
}
