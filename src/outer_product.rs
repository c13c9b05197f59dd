//! Hardware outer-product path (spec §4.3, matrix-engine FMOPA).
//!
//! `OuterProductEngine` is the out-of-scope ISA collaborator's contract;
//! [`ReferenceEngine`] is the portable fallback every dispatch pointer
//! reduces to when no real tile-accumulator instruction is available
//! (which, on the hosts this crate can detect without a platform-specific
//! probe, is always — `HasSME` is wired to `false` in
//! [`crate::cpu_features`] until a platform collaborator fills it in).
//! What lives in this module — padding, transpose, the scoped guard, and
//! strided accumulation for unaligned shapes — is genuinely part of the
//! core; only the tile instruction itself is external.

use crate::buffer_pool::{BufferPools, GlobalPools};
use crate::error::{check_dims, Result};
use crate::scoped_guard::StreamingModeGuard;
use crate::streaming::streaming_matmul;
use crate::transpose::transpose2d;
use crate::types::Element;

/// Below this size on any dimension, padding to a tile multiple and
/// invoking the matrix engine is not worthwhile (spec §4.3).
pub const SME_WORTHWHILE_THRESHOLD: usize = 32;

/// `MultiTileMatMulFMOPA` / `MultiTileMatMulFMOPAStrided` (spec §4.3).
/// `aT` is pre-transposed A (`K x M`), `b` is `K x N`, `c` is `M x N`;
/// `c += aTᵀ · b`. All dimensions must be multiples of `tile_size()`.
pub trait OuterProductEngine<T: Element> {
    fn tile_size(&self) -> usize;

    /// # Safety
    /// `aT` valid for `k*m`, `b` for `k*n`, `c` for `m*n` reads/writes;
    /// `m, n, k` are multiples of [`Self::tile_size`].
    unsafe fn matmul_fmopa(&self, a_t: *const T, b: *const T, c: *mut T, m: usize, n: usize, k: usize);

    /// As [`Self::matmul_fmopa`], but `c`'s columns `[col_offset,
    /// col_offset+n)` live inside a wider matrix of leading dimension
    /// `ldc` (spec §4.3, used by the K-last incremental pipeline and
    /// fused-quantization paths to write directly into final output).
    ///
    /// # Safety
    /// `c` valid for `m` rows of `ldc` elements each, writes confined to
    /// `[col_offset, col_offset+n)` of each row.
    unsafe fn matmul_fmopa_strided(
        &self,
        a_t: *const T,
        b: *const T,
        c: *mut T,
        m: usize,
        n: usize,
        k: usize,
        ldc: usize,
        col_offset: usize,
    );
}

/// Portable reference engine: accumulates one `tile x tile` rank-1
/// update per "issue" the way a real FMOPA instruction would, just in
/// plain scalar arithmetic. Exists so the padding/transpose machinery in
/// this module has something real to drive in tests and under
/// `HWY_NO_SIMD`.
pub struct ReferenceEngine {
    pub tile: usize,
}

impl<T: Element> OuterProductEngine<T> for ReferenceEngine {
    fn tile_size(&self) -> usize {
        self.tile
    }

    unsafe fn matmul_fmopa(&self, a_t: *const T, b: *const T, c: *mut T, m: usize, n: usize, k: usize) {
        self.matmul_fmopa_strided(a_t, b, c, m, n, k, n, 0);
    }

    unsafe fn matmul_fmopa_strided(
        &self,
        a_t: *const T,
        b: *const T,
        c: *mut T,
        m: usize,
        n: usize,
        k: usize,
        ldc: usize,
        col_offset: usize,
    ) {
        for i in 0..m {
            for j in 0..n {
                let mut acc = <T as num_traits::Zero>::zero().to_acc();
                for p in 0..k {
                    let av = *a_t.add(p * m + i);
                    let bv = *b.add(p * n + j);
                    acc = acc + T::mul_acc(av, bv);
                }
                let dst = c.add(i * ldc + col_offset + j);
                *dst = *dst + T::from_acc(acc);
            }
        }
    }
}

#[inline]
fn padded(x: usize, tile: usize) -> usize {
    if tile == 0 {
        x
    } else {
        (x + tile - 1) / tile * tile
    }
}

/// `C <- A*B` (standard layout) via a tile-aligned hardware outer
/// product, padding unaligned shapes and extracting the visible `M x N`
/// region back out (spec §4.3). Delegates to [`streaming_matmul`] when
/// any dimension is below [`SME_WORTHWHILE_THRESHOLD`].
pub fn matmul_fmopa<T: Element, E: OuterProductEngine<T>>(
    engine: &E,
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
) -> Result<()>
where
    T: GlobalPools,
{
    check_dims("A", a.len(), m, k)?;
    check_dims("B", b.len(), k, n)?;
    check_dims("C", c.len(), m, n)?;

    if m < SME_WORTHWHILE_THRESHOLD || n < SME_WORTHWHILE_THRESHOLD || k < SME_WORTHWHILE_THRESHOLD {
        return streaming_matmul::<T>(a, b, c, m, n, k);
    }

    let tile = engine.tile_size();
    let p_m = padded(m, tile);
    let p_n = padded(n, tile);
    let p_k = padded(k, tile);

    let pools = T::global_pools();
    let needs_pad_a = p_k != k || p_m != m;
    let needs_pad_b = p_k != k || p_n != n;
    let needs_pad_c = p_m != m || p_n != n;

    // Materialize padded A (p_m x p_k), zero-filling new rows/cols.
    let mut padded_a_holder;
    let a_src: &[T] = if needs_pad_a {
        padded_a_holder = pools.padded_a.get(p_m * p_k);
        padded_a_holder.clear_zero();
        for i in 0..m {
            let src = &a[i * k..i * k + k];
            let dst_off = i * p_k;
            padded_a_holder[dst_off..dst_off + k].copy_from_slice(src);
        }
        &padded_a_holder
    } else {
        a
    };

    let mut padded_b_holder;
    let b_src: &[T] = if needs_pad_b {
        padded_b_holder = pools.padded_b.get(p_k * p_n);
        padded_b_holder.clear_zero();
        for i in 0..k {
            let src = &b[i * n..i * n + n];
            let dst_off = i * p_n;
            padded_b_holder[dst_off..dst_off + n].copy_from_slice(src);
        }
        &padded_b_holder
    } else {
        b
    };

    // Transpose padded A to aT (p_k x p_m).
    let mut a_t = vec![T::zero(); p_k * p_m];
    unsafe { transpose2d::<T>(a_src.as_ptr(), p_m, p_k, a_t.as_mut_ptr()) };

    let guard = StreamingModeGuard::acquire();

    if needs_pad_c {
        let mut padded_c_holder = pools.padded_c.get(p_m * p_n);
        padded_c_holder.clear_zero();
        unsafe {
            engine.matmul_fmopa(
                a_t.as_ptr(),
                b_src.as_ptr(),
                padded_c_holder.as_mut_ptr(),
                p_m,
                p_n,
                p_k,
            );
        }
        for i in 0..m {
            let src_off = i * p_n;
            c[i * n..i * n + n].copy_from_slice(&padded_c_holder[src_off..src_off + n]);
        }
    } else {
        for v in &mut c[..m * n] {
            *v = T::zero();
        }
        unsafe {
            engine.matmul_fmopa(a_t.as_ptr(), b_src.as_ptr(), c.as_mut_ptr(), m, n, k);
        }
    }

    drop(guard);
    Ok(())
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
    fn unaligned_shapes_match_reference_and_dont_read_padding() {
        let (m, n, k) = (33, 33, 33);
        let a: Vec<f32> = (0..m * k).map(|i| ((i % 9) as f32) * 0.1 - 0.4).collect();
        let b: Vec<f32> = (0..k * n).map(|i| ((i % 7) as f32) * 0.1 - 0.3).collect();
        let expected = reference(&a, &b, m, n, k);

        let engine = ReferenceEngine { tile: 16 };
        let mut c = vec![0f32; m * n];
        matmul_fmopa::<f32, _>(&engine, &a, &b, &mut c, m, n, k).unwrap();

        let tol = 1e-4 * k as f32;
        for (got, want) in c.iter().zip(expected.iter()) {
            assert!((got - want).abs() <= tol);
        }
    }

    #[test]
    fn below_threshold_delegates_to_streaming() {
        let (m, n, k) = (8, 8, 8);
        let a: Vec<f32> = (0..m * k).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..k * n).map(|i| i as f32).collect();
        let expected = reference(&a, &b, m, n, k);

        let engine = ReferenceEngine { tile: 16 };
        let mut c = vec![0f32; m * n];
        matmul_fmopa::<f32, _>(&engine, &a, &b, &mut c, m, n, k).unwrap();
        assert_eq!(c, expected);
    }
}
