//! Blocked kernel (spec §4.1: "below `LargeMatrixThreshold`: parallel
//! blocked with RowsPerStrip strips"). Serial entry points; `parallel.rs`
//! wraps these with strip/fine-grained parallelism.
//!
//! `block_mul_add` is the `BlockMulAdd<T>` kernel extension point (spec
//! §6): it takes **pre-transposed** A (`K x M`) so the innermost loop
//! walks `aT` column-major-by-row (i.e. row-contiguous in `aT`), matching
//! the cache-friendly access pattern a GotoBLAS-style blocked kernel
//! wants without paying for full packing.

use crate::error::{check_dims, Result};
use crate::transpose::transpose2d;
use crate::types::Element;

const BLOCK_K: usize = 256;

/// Accumulates `C[row_start..row_end, :] += A[row_start..row_end, :] * B`
/// for the standard layout, given `aT` (`K x M`, pre-transposed A) and
/// `b` (`K x N`). `c` is `M x N`; only rows `[row_start, row_end)` are
/// touched.
pub fn block_mul_add<T: Element>(
    a_t: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
    row_start: usize,
    row_end: usize,
) {
    // Accumulate in `T::Acc` across the whole K range (including across
    // `BLOCK_K`-sized chunks) and convert to `T` once per element at the
    // end, rather than rounding every chunk.
    let rows = row_end - row_start;
    let mut acc = vec![<T as num_traits::Zero>::zero().to_acc(); rows * n];

    let mut pc = 0;
    while pc < k {
        let k_chunk = BLOCK_K.min(k - pc);
        for i in row_start..row_end {
            let acc_row = &mut acc[(i - row_start) * n..(i - row_start) * n + n];
            for p in pc..pc + k_chunk {
                let av = a_t[p * m + i];
                if av == T::zero() {
                    continue;
                }
                let b_row = &b[p * n..p * n + n];
                for j in 0..n {
                    acc_row[j] = acc_row[j] + T::mul_acc(av, b_row[j]);
                }
            }
        }
        pc += k_chunk;
    }

    for i in row_start..row_end {
        let c_row = &mut c[i * n..i * n + n];
        let acc_row = &acc[(i - row_start) * n..(i - row_start) * n + n];
        for j in 0..n {
            c_row[j] = c_row[j] + T::from_acc(acc_row[j]);
        }
    }
}

/// `C <- A*B`, standard layout, serial. Transposes `A` once, then calls
/// [`block_mul_add`] over the whole row range.
pub fn blocked_matmul<T: Element>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) -> Result<()> {
    check_dims("A", a.len(), m, k)?;
    check_dims("B", b.len(), k, n)?;
    check_dims("C", c.len(), m, n)?;

    for v in &mut c[..m * n] {
        *v = T::zero();
    }

    let mut a_t = vec![T::zero(); k * m];
    unsafe { transpose2d::<T>(a.as_ptr(), m, k, a_t.as_mut_ptr()) };

    block_mul_add::<T>(&a_t, b, c, m, n, k, 0, m);
    Ok(())
}

/// `C <- A*Bᵀ`, K-last layout, serial. No transpose of `B` needed: each
/// output row/col pair is a dot product of two already-contiguous rows,
/// blocked over `K` only to bound the accumulator's working set.
pub fn blocked_matmul_klast<T: Element>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) -> Result<()> {
    check_dims("A", a.len(), m, k)?;
    check_dims("B", b.len(), n, k)?;
    check_dims("C", c.len(), m, n)?;

    for i in 0..m {
        let a_row = &a[i * k..i * k + k];
        for j in 0..n {
            let b_row = &b[j * k..j * k + k];
            let mut acc = <T as num_traits::Zero>::zero().to_acc();
            let mut pc = 0;
            while pc < k {
                let k_chunk = BLOCK_K.min(k - pc);
                for p in pc..pc + k_chunk {
                    acc = acc + T::mul_acc(a_row[p], b_row[p]);
                }
                pc += k_chunk;
            }
            c[i * n + j] = T::from_acc(acc);
        }
    }
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
    fn blocked_matches_reference() {
        let (m, n, k) = (11, 37, 129);
        let a: Vec<f32> = (0..m * k).map(|i| ((i % 17) as f32) * 0.05 - 0.4).collect();
        let b: Vec<f32> = (0..k * n).map(|i| ((i % 13) as f32) * 0.05 - 0.3).collect();
        let expected = reference(&a, &b, m, n, k);

        let mut c = vec![0f32; m * n];
        blocked_matmul::<f32>(&a, &b, &mut c, m, n, k).unwrap();

        let tol = 1e-4 * k as f32;
        for (got, want) in c.iter().zip(expected.iter()) {
            assert!((got - want).abs() <= tol);
        }
    }
}
