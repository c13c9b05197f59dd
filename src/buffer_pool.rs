//! Process-wide buffer pools (spec §4.6), one per `(T, purpose)`.
//!
//! Get-semantics: pop a free slice of length >= request, or allocate a
//! new one. Put-semantics: the slice is logically emptied (`len == 0`,
//! capacity preserved) before being returned to the free list — this
//! happens automatically on [`Pooled::drop`]. Contamination from stale
//! data is prevented by the rule in spec §4.6: a pool never auto-zeros on
//! `get`, so any consumer that requires zeros (padded-C, padded A/B)
//! must call [`Pooled::clear_zero`] itself before use.

use crate::types::Element;
use std::sync::Mutex;

/// A free list of reusable `Vec<T>` scratch buffers for one purpose.
pub struct Pool<T> {
    free: Mutex<Vec<Vec<T>>>,
}

impl<T: Element> Default for Pool<T> {
    fn default() -> Self {
        Pool {
            free: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Element> Pool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a buffer of length exactly `len`. Existing contents beyond
    /// the old length are not defined to be zero; only the region that
    /// survives from a previous holder's tail may be stale.
    pub fn get(&self, len: usize) -> Pooled<'_, T> {
        let mut buf = self.free.lock().unwrap().pop().unwrap_or_default();
        if buf.len() < len {
            buf.resize(len, T::zero());
        } else {
            buf.truncate(len);
        }
        Pooled {
            pool: self,
            buf: Some(buf),
        }
    }

    fn put(&self, mut buf: Vec<T>) {
        buf.clear();
        self.free.lock().unwrap().push(buf);
    }
}

/// A buffer on loan from a [`Pool`]. Released back on drop with its
/// length reset to 0 (capacity preserved), never while aliased by
/// another worker (spec §3 "Ownership and lifecycle").
pub struct Pooled<'a, T: Element> {
    pool: &'a Pool<T>,
    buf: Option<Vec<T>>,
}

impl<'a, T: Element> Pooled<'a, T> {
    /// Explicitly zero the buffer. Required before use whenever
    /// correctness depends on zeros (spec §4.6).
    #[inline]
    pub fn clear_zero(&mut self) {
        for v in self.buf.as_mut().unwrap().iter_mut() {
            *v = T::zero();
        }
    }
}

impl<'a, T: Element> core::ops::Deref for Pooled<'a, T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        self.buf.as_ref().unwrap()
    }
}

impl<'a, T: Element> core::ops::DerefMut for Pooled<'a, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.buf.as_mut().unwrap()
    }
}

impl<'a, T: Element> Drop for Pooled<'a, T> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}

/// The nine named pools of spec §4.6: transposed A/B, padded A/B/C,
/// K-last A/B transpose scratch, and the fused-quantization dequant/
/// output tile pools (the latter two are a fixed-point extension of this
/// matmul core and are kept empty unless a quantized path populates
/// them; they exist so the pool registry shape matches spec §4.6
/// exactly).
#[derive(Default)]
pub struct BufferPools<T: Element> {
    pub transposed_a: Pool<T>,
    pub transposed_b: Pool<T>,
    pub padded_a: Pool<T>,
    pub padded_b: Pool<T>,
    pub padded_c: Pool<T>,
    pub klast_a_transpose: Pool<T>,
    pub klast_b_transpose: Pool<T>,
    pub dequant_tile: Pool<T>,
    pub output_tile: Pool<T>,
}

impl<T: Element> BufferPools<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Process-wide default registry, one instance per concrete element
/// type (spec §4.6: "one pool per (T, purpose)"). A blanket generic
/// `static` can't hold `BufferPools<T>` for an open-ended `T`, so each
/// of the four element types gets its own `OnceCell` via
/// [`GlobalPools::global`]; callers reach it as `T::global_pools()`.
pub trait GlobalPools: Element + Sized {
    fn global_pools() -> &'static BufferPools<Self>;
}

macro_rules! impl_global_pools {
    ($ty:ty) => {
        impl GlobalPools for $ty {
            fn global_pools() -> &'static BufferPools<$ty> {
                static CELL: once_cell::sync::OnceCell<BufferPools<$ty>> =
                    once_cell::sync::OnceCell::new();
                CELL.get_or_init(BufferPools::new)
            }
        }
    };
}

impl_global_pools!(f32);
impl_global_pools!(f64);
impl_global_pools!(half::f16);
impl_global_pools!(half::bf16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_then_put_resets_length_not_capacity() {
        let pool: Pool<f32> = Pool::new();
        {
            let mut buf = pool.get(16);
            assert_eq!(buf.len(), 16);
            buf.clear_zero();
            assert!(buf.iter().all(|&v| v == 0.0));
        }
        let reused = pool.get(4);
        assert_eq!(reused.len(), 4);
    }

    #[test]
    fn never_auto_zeroed_without_explicit_clear() {
        let pool: Pool<f32> = Pool::new();
        {
            let mut buf = pool.get(8);
            for v in buf.iter_mut() {
                *v = 7.0;
            }
        }
        let reused = pool.get(8);
        // Stale contents from the previous holder may survive; callers
        // that need zeros must ask for them explicitly.
        assert!(reused.iter().any(|&v| v == 7.0));
    }
}
