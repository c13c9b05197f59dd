//! The GEBP five-loop (spec §4.2): `PackedMatMul` (V1, accumulates
//! straight into `C`) and the V2 packed-output variant that writes full
//! `Mr x Nr` tiles into a zeroed `Mc x Nc` scratch before a separate
//! apply pass. Loop order and K-accumulation order follow spec §4.2
//! exactly; this determines the floating-point rounding the test suite
//! assumes (spec §5 "Ordering guarantees").

use crate::cache::CacheParams;
use crate::error::{check_dims, Result};
use crate::microkernel::{
    apply_packed_output_accum, apply_packed_output_simple, packed_micro_kernel,
    packed_micro_kernel_partial,
};
use crate::pack::{packed_lhs_len, packed_rhs_len, pack_lhs, pack_rhs};
use crate::types::Element;
use aligned_vec::avec;
use num_traits::Zero;

/// Zero-fills `c` (`m x n`, row-major, row stride `n`). Spec §4.2: "C
/// must be zeroed once at the top of the call".
#[inline]
pub fn zero_output<T: Element>(c: &mut [T], m: usize, n: usize) {
    for v in &mut c[..m * n] {
        *v = T::zero();
    }
}

/// `C <- A*B` via the five-loop GEBP algorithm (V1: GEBP accumulates
/// straight into `C`, no packed-output buffer). `a` is `m x k`, `b` is
/// `k x n`, `c` is `m x n`, all row-major contiguous (spec §3: no
/// strides).
pub fn packed_matmul<T: Element>(
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
    cache: &CacheParams,
) -> Result<()> {
    check_dims("A", a.len(), m, k)?;
    check_dims("B", b.len(), k, n)?;
    check_dims("C", c.len(), m, n)?;

    zero_output(c, m, n);

    let mr = cache.mr;
    let nr = cache.nr;
    let kc = cache.kc;
    let mc = cache.mc;
    let nc = cache.nc;

    // Packed-A/packed-B scratch is cacheline-aligned (`aligned_vec::avec!`,
    // the teacher's own alignment story) so the micro-kernel's vector
    // loads never straddle a cacheline.
    let mut packed_a = avec![T::zero(); packed_lhs_len(mr, mc, kc)];
    let mut packed_b = avec![T::zero(); packed_rhs_len(nr, nc, kc)];

    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();
    let c_ptr = c.as_mut_ptr();

    let mut jc = 0;
    while jc < n {
        let n_chunk = nc.min(n - jc);

        let mut pc = 0;
        while pc < k {
            let k_chunk = kc.min(k - pc);

            unsafe {
                pack_rhs::<T>(nr, k_chunk, n_chunk, pc, jc, b_ptr, n, packed_b.as_mut_ptr());
            }

            let mut ic = 0;
            while ic < m {
                let m_chunk = mc.min(m - ic);

                unsafe {
                    pack_lhs::<T>(mr, m_chunk, k_chunk, ic, pc, a_ptr, k, packed_a.as_mut_ptr());
                }

                unsafe {
                    gebp_panel::<T>(
                        packed_a.as_ptr(),
                        packed_b.as_ptr(),
                        c_ptr.add(ic * n + jc),
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

    Ok(())
}

/// Iterates the `(jr, ir)` micro-panel grid of one `(panel_rows,
/// panel_cols)` GEBP call, dispatching full tiles to
/// [`packed_micro_kernel`] and partial (last-row/col) tiles to
/// [`packed_micro_kernel_partial`].
///
/// # Safety
/// `packed_a` must hold `ceil(panel_rows/mr)*panel_k*mr` valid `T`,
/// `packed_b` `ceil(panel_cols/nr)*panel_k*nr`; `c` must be valid for
/// `panel_rows` rows / `panel_cols` cols at stride `c_row_stride`.
#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn gebp_panel<T: Element>(
    packed_a: *const T,
    packed_b: *const T,
    c: *mut T,
    c_row_stride: isize,
    panel_rows: usize,
    panel_cols: usize,
    panel_k: usize,
    mr: usize,
    nr: usize,
) {
    let n_row_panels = (panel_rows + mr - 1) / mr;
    let n_col_panels = (panel_cols + nr - 1) / nr;

    for jr in 0..n_col_panels {
        let col0 = jr * nr;
        let cols_here = (panel_cols - col0).min(nr);
        let b_panel = packed_b.add(jr * panel_k * nr);

        for ir in 0..n_row_panels {
            let row0 = ir * mr;
            let rows_here = (panel_rows - row0).min(mr);
            let a_panel = packed_a.add(ir * panel_k * mr);
            let c_tile = c.offset(row0 as isize * c_row_stride + col0 as isize);

            if rows_here == mr && cols_here == nr {
                packed_micro_kernel::<T>(mr, nr, panel_k, a_panel, b_panel, c_tile, c_row_stride);
            } else {
                packed_micro_kernel_partial::<T>(
                    mr,
                    nr,
                    rows_here,
                    cols_here,
                    panel_k,
                    a_panel,
                    b_panel,
                    c_tile,
                    c_row_stride,
                );
            }
        }
    }
}

/// V2 GEBP: each `(jc, pc, ic)` call writes full `Mr x Nr` tiles into a
/// zeroed `Mc x Nc` packed-output scratch (no bounds checks needed in the
/// inner kernel), then applies scratch -> C with
/// [`apply_packed_output_simple`] on the first K-pass and
/// [`apply_packed_output_accum`] on subsequent passes (spec §4.2 "V2
/// GEBP").
pub fn packed_matmul_v2<T: Element>(
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
    cache: &CacheParams,
) -> Result<()> {
    check_dims("A", a.len(), m, k)?;
    check_dims("B", b.len(), k, n)?;
    check_dims("C", c.len(), m, n)?;

    zero_output(c, m, n);

    let mr = cache.mr;
    let nr = cache.nr;
    let kc = cache.kc;
    let mc = cache.mc;
    let nc = cache.nc;

    let mut packed_a = avec![T::zero(); packed_lhs_len(mr, mc, kc)];
    let mut packed_b = avec![T::zero(); packed_rhs_len(nr, nc, kc)];
    let mut packed_out = avec![T::zero(); mc * nc];

    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();
    let c_ptr = c.as_mut_ptr();

    let mut jc = 0;
    while jc < n {
        let n_chunk = nc.min(n - jc);

        let mut pc = 0;
        while pc < k {
            let k_chunk = kc.min(k - pc);
            let accumulate = pc > 0;

            unsafe {
                pack_rhs::<T>(nr, k_chunk, n_chunk, pc, jc, b_ptr, n, packed_b.as_mut_ptr());
            }

            let mut ic = 0;
            while ic < m {
                let m_chunk = mc.min(m - ic);

                unsafe {
                    pack_lhs::<T>(mr, m_chunk, k_chunk, ic, pc, a_ptr, k, packed_a.as_mut_ptr());
                }

                for v in packed_out.iter_mut().take(m_chunk.min(mc) * nc) {
                    *v = T::zero();
                }

                unsafe {
                    gebp_panel::<T>(
                        packed_a.as_ptr(),
                        packed_b.as_ptr(),
                        packed_out.as_mut_ptr(),
                        nc as isize,
                        m_chunk,
                        n_chunk,
                        k_chunk,
                        mr,
                        nr,
                    );

                    let c_tile = c_ptr.add(ic * n + jc);
                    if accumulate {
                        apply_packed_output_accum::<T>(
                            m_chunk,
                            n_chunk,
                            packed_out.as_ptr(),
                            nc,
                            c_tile,
                            n as isize,
                        );
                    } else {
                        apply_packed_output_simple::<T>(
                            m_chunk,
                            n_chunk,
                            packed_out.as_ptr(),
                            nc,
                            c_tile,
                            n as isize,
                        );
                    }
                }

                ic += m_chunk;
            }
            pc += k_chunk;
        }
        jc += n_chunk;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::kernel_params;

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
    fn v1_matches_reference_on_misaligned_shapes() {
        let (m, n, k) = (33, 33, 33);
        let a: Vec<f32> = (0..m * k).map(|i| ((i % 13) as f32) * 0.1 - 0.5).collect();
        let b: Vec<f32> = (0..k * n).map(|i| ((i % 11) as f32) * 0.1 - 0.4).collect();
        let expected = reference(&a, &b, m, n, k);

        let cache = kernel_params::<f32>(8, 4).unwrap();
        let mut c = vec![0f32; m * n];
        packed_matmul::<f32>(&a, &b, &mut c, m, n, k, &cache).unwrap();

        let tol = 1e-4 * k as f32;
        for (got, want) in c.iter().zip(expected.iter()) {
            assert!((got - want).abs() <= tol, "{} vs {}", got, want);
        }
    }

    #[test]
    fn v1_and_v2_agree() {
        let (m, n, k) = (67, 40, 50);
        let a: Vec<f32> = (0..m * k).map(|i| ((i % 9) as f32) * 0.2 - 1.0).collect();
        let b: Vec<f32> = (0..k * n).map(|i| ((i % 7) as f32) * 0.2 - 0.7).collect();

        let cache = kernel_params::<f32>(8, 4).unwrap();
        let mut c1 = vec![1234f32; m * n];
        let mut c2 = vec![-987f32; m * n];
        packed_matmul::<f32>(&a, &b, &mut c1, m, n, k, &cache).unwrap();
        packed_matmul_v2::<f32>(&a, &b, &mut c2, m, n, k, &cache).unwrap();

        for (v1, v2) in c1.iter().zip(c2.iter()) {
            assert!((v1 - v2).abs() <= 1e-2, "{} vs {}", v1, v2);
        }
    }

    #[test]
    fn preexisting_c_content_has_no_effect() {
        let (m, n, k) = (16, 16, 16);
        let a: Vec<f32> = (0..m * k).map(|i| i as f32 + 1.0).collect();
        let b: Vec<f32> = (0..k * n).map(|i| i as f32 + 1.0).collect();
        let cache = kernel_params::<f32>(8, 4).unwrap();

        let mut c_clean = vec![0f32; m * n];
        packed_matmul::<f32>(&a, &b, &mut c_clean, m, n, k, &cache).unwrap();

        let mut c_dirty = vec![f32::NAN; m * n];
        // NAN poisons sums under +=, so seed with large finite garbage instead.
        for v in c_dirty.iter_mut() {
            *v = 9999.0;
        }
        packed_matmul::<f32>(&a, &b, &mut c_dirty, m, n, k, &cache).unwrap();

        assert_eq!(c_clean, c_dirty);
    }
}
