//! `Transpose2D<T>` / `Transpose2DStrided<T>` (spec §6 kernel extension
//! points). Transpose internals proper are out of scope (spec §1); what
//! lives here is the portable fallback every dispatch pointer reduces to,
//! used by the blocked kernel's pre-transposed-A path (§6 `BlockMulAdd`),
//! the hardware outer-product padding path (§4.3), and the K-last
//! incremental transpose pipeline (§4.5).

use crate::types::Element;

/// Transposes `src` (`rows x cols`, row-major, row stride `cols`) into
/// `dst` (`cols x rows`, row-major, row stride `rows`).
///
/// # Safety
/// `src` must be valid for `rows * cols` reads; `dst` for `rows * cols`
/// writes.
pub unsafe fn transpose2d<T: Element>(src: *const T, rows: usize, cols: usize, dst: *mut T) {
    for i in 0..rows {
        let row = src.add(i * cols);
        for j in 0..cols {
            *dst.add(j * rows + i) = *row.add(j);
        }
    }
}

/// Transposes `src` (`rows x cols`, row stride `src_row_stride`) into a
/// strided destination with row stride `dst_row_stride` and column offset
/// `col_offset`, `dst` being the top-left of a wider matrix. Used when
/// the destination of a transpose is itself a strip of a larger buffer
/// (spec §4.5 step 3).
///
/// # Safety
/// `src` must be valid for `rows` rows at `src_row_stride`; `dst` must be
/// valid for `cols` rows (each of length `rows + col_offset`) at
/// `dst_row_stride`.
pub unsafe fn transpose2d_strided<T: Element>(
    src: *const T,
    rows: usize,
    cols: usize,
    src_row_stride: usize,
    dst: *mut T,
    dst_row_stride: usize,
    col_offset: usize,
) {
    for i in 0..rows {
        let row = src.add(i * src_row_stride);
        for j in 0..cols {
            *dst.add(j * dst_row_stride + col_offset + i) = *row.add(j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let rows = 5;
        let cols = 3;
        let src: Vec<f32> = (0..rows * cols).map(|i| i as f32).collect();
        let mut dst = vec![0f32; rows * cols];
        unsafe { transpose2d::<f32>(src.as_ptr(), rows, cols, dst.as_mut_ptr()) };

        for i in 0..rows {
            for j in 0..cols {
                assert_eq!(dst[j * rows + i], src[i * cols + j]);
            }
        }
    }
}
