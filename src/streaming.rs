//! Streaming kernel (spec §4.1: "below `SmallMatrixThreshold`: streaming
//! beats blocking"). Portable fallback: a row-major `i-p-j` triple loop
//! that keeps the inner loop over `j` sequential in both `B` and `C`
//! (cache-friendly without any packing overhead, which is the point for
//! small shapes).

use crate::error::{check_dims, Result};
use crate::types::Element;

/// `C <- A*B`, standard layout. `a` is `m x k`, `b` is `k x n`, `c` is
/// `m x n`, row-major contiguous.
pub fn streaming_matmul<T: Element>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) -> Result<()> {
    check_dims("A", a.len(), m, k)?;
    check_dims("B", b.len(), k, n)?;
    check_dims("C", c.len(), m, n)?;

    for v in &mut c[..m * n] {
        *v = T::zero();
    }

    // Accumulate each row's K-reduction in `T::Acc` (f32 for f16/bf16) and
    // convert to `T` once per element, rather than rounding every step.
    let mut acc_row = vec![<T as num_traits::Zero>::zero().to_acc(); n];
    for i in 0..m {
        let a_row = &a[i * k..i * k + k];
        for v in acc_row.iter_mut() {
            *v = <T as num_traits::Zero>::zero().to_acc();
        }
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
        let c_row = &mut c[i * n..i * n + n];
        for j in 0..n {
            c_row[j] = T::from_acc(acc_row[j]);
        }
    }
    Ok(())
}

/// `C <- A*Bᵀ`, K-last layout. `a` is `m x k`, `b` is `n x k`, `c` is
/// `m x n`.
pub fn streaming_matmul_klast<T: Element>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) -> Result<()> {
    check_dims("A", a.len(), m, k)?;
    check_dims("B", b.len(), n, k)?;
    check_dims("C", c.len(), m, n)?;

    for i in 0..m {
        let a_row = &a[i * k..i * k + k];
        for j in 0..n {
            let b_row = &b[j * k..j * k + k];
            let mut acc = <T as num_traits::Zero>::zero().to_acc();
            for p in 0..k {
                acc = acc + T::mul_acc(a_row[p], b_row[p]);
            }
            c[i * n + j] = T::from_acc(acc);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_identity() {
        let n = 16;
        let mut a = vec![0f32; n * n];
        for i in 0..n {
            a[i * n + i] = 1.0;
        }
        let b = a.clone();
        let mut c = vec![-1f32; n * n];
        streaming_matmul::<f32>(&a, &b, &mut c, n, n, n).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn klast_equals_standard_with_explicit_transpose() {
        let (m, n, k) = (2, 2, 3);
        let a = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b_klast = vec![7.0f32, 8.0, 9.0, 10.0, 11.0, 12.0]; // n x k
        let mut c_klast = vec![0f32; m * n];
        streaming_matmul_klast::<f32>(&a, &b_klast, &mut c_klast, m, n, k).unwrap();
        assert_eq!(c_klast, vec![50.0, 68.0, 122.0, 167.0]);
    }

    #[test]
    fn k_equal_one_is_correct() {
        let (m, n, k) = (3, 2, 1);
        let a = vec![1f32, 2.0, 3.0];
        let b = vec![4f32, 5.0];
        let mut c = vec![0f32; m * n];
        streaming_matmul::<f32>(&a, &b, &mut c, m, n, k).unwrap();
        assert_eq!(c, vec![4.0, 5.0, 8.0, 10.0, 12.0, 15.0]);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let a = vec![0f32; 2];
        let b = vec![0f32; 4];
        let mut c = vec![0f32; 4];
        assert!(streaming_matmul::<f32>(&a, &b, &mut c, 2, 2, 2).is_err());
    }
}
