//! K-last incremental transpose (spec §4.5).
//!
//! `MatMulKLast`/`MatMulKLastBlocked` compute `C = A * Bᵀ` (`A` is `M x
//! K`, `B` is `N x K`). The streaming/blocked fallbacks in
//! `streaming.rs`/`blocked.rs` need no transpose at all (each output
//! element is already a dot product of two contiguous rows). This module
//! is for the hardware-outer-product K-last path, which *does* want `aT`
//! (`K x M`) and strips of `B` transposed to `(K x stripN)`, without ever
//! materializing a full `K x N` transpose of `B`.

use crate::buffer_pool::{BufferPools, GlobalPools};
use crate::error::{check_dims, Result};
use crate::outer_product::{OuterProductEngine, SME_WORTHWHILE_THRESHOLD};
use crate::streaming::streaming_matmul_klast;
use crate::transpose::{transpose2d, transpose2d_strided};
use crate::types::Element;

/// Strip width used when transposing `B` a strip at a time (spec §4.5
/// step 2: "a small constant multiple of the hardware tile size, e.g.
/// 48 for f32").
pub const STRIP_N: usize = 48;

#[inline]
fn padded(x: usize, tile: usize) -> usize {
    if tile == 0 {
        x
    } else {
        (x + tile - 1) / tile * tile
    }
}

/// `C <- A*Bᵀ` via the incremental-transpose hardware outer-product
/// pipeline (spec §4.5): transpose `A` once; for each `stripN`-wide
/// strip of `B`'s rows, transpose only that strip, then invoke the
/// strided outer-product kernel to accumulate into `C`'s matching
/// columns. Falls back to the streaming K-last kernel below
/// [`SME_WORTHWHILE_THRESHOLD`].
pub fn matmul_klast_fmopa<T: Element, E: OuterProductEngine<T>>(
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
    check_dims("B", b.len(), n, k)?;
    check_dims("C", c.len(), m, n)?;

    if m < SME_WORTHWHILE_THRESHOLD || n < SME_WORTHWHILE_THRESHOLD || k < SME_WORTHWHILE_THRESHOLD {
        return streaming_matmul_klast::<T>(a, b, c, m, n, k);
    }

    for v in &mut c[..m * n] {
        *v = T::zero();
    }

    let tile = engine.tile_size();
    let p_m = padded(m, tile);
    let p_k = padded(k, tile);

    let pools = T::global_pools();

    // Pad A once (M-padding is handled once outside the strip loop, per
    // spec §4.5 step 5), then transpose to aT (p_k x p_m).
    let mut padded_a = pools.padded_a.get(p_m * p_k);
    padded_a.clear_zero();
    for i in 0..m {
        let src = &a[i * k..i * k + k];
        let dst_off = i * p_k;
        padded_a[dst_off..dst_off + k].copy_from_slice(src);
    }

    let mut a_t = pools.klast_a_transpose.get(p_k * p_m);
    unsafe { transpose2d::<T>(padded_a.as_ptr(), p_m, p_k, a_t.as_mut_ptr()) };

    let mut j = 0;
    while j < n {
        let strip_n = STRIP_N.min(n - j);
        let p_sn = padded(strip_n, tile);

        // Transpose this strip of B rows directly into a zero-padded
        // (p_k x p_sn) buffer: `transpose2d_strided` writes the real
        // (strip_n x k) region at column offset 0, leaving the padded
        // tail (rows k..p_k, cols strip_n..p_sn) at the zero the buffer
        // was cleared to. Avoids ever materializing a padded copy of the
        // strip before transposing it (spec §4.5 step 5: "padding the
        // strip only").
        let mut b_t = pools.klast_b_transpose.get(p_k * p_sn);
        b_t.clear_zero();
        unsafe {
            transpose2d_strided::<T>(
                b.as_ptr().add(j * k),
                strip_n,
                k,
                k,
                b_t.as_mut_ptr(),
                p_sn,
                0,
            );
        }

        // Accumulate into C columns [j, j+strip_n) with leading
        // dimension n (spec §4.5 step 4). p_m may exceed m; only the
        // first m rows of C are real, so compute into a padded scratch
        // when M needed padding, else write straight into C.
        if p_m != m {
            let mut padded_c_strip = vec![T::zero(); p_m * p_sn];
            unsafe {
                engine.matmul_fmopa_strided(
                    a_t.as_ptr(),
                    b_t.as_ptr(),
                    padded_c_strip.as_mut_ptr(),
                    p_m,
                    p_sn,
                    p_k,
                    p_sn,
                    0,
                );
            }
            for i in 0..m {
                for r in 0..strip_n {
                    c[i * n + j + r] = c[i * n + j + r] + padded_c_strip[i * p_sn + r];
                }
            }
        } else {
            unsafe {
                engine.matmul_fmopa_strided(a_t.as_ptr(), b_t.as_ptr(), c.as_mut_ptr(), m, strip_n, p_k, n, j);
            }
        }

        j += strip_n;
    }

    Ok(())
}
