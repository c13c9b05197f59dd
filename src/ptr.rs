//! `Send`/`Sync` wrapper around a raw pointer, carried over from the
//! teacher's `gemm.rs` (`Ptr`). Worker closures capture one of these
//! instead of the raw pointer so the compiler accepts the cross-thread
//! move; the actual safety argument (disjoint output ranges per work
//! item) lives with the callers in `parallel.rs` / `klast.rs`.

#[derive(Clone, Copy)]
pub(crate) struct Ptr<T>(pub *mut T);

unsafe impl<T> Send for Ptr<T> {}
unsafe impl<T> Sync for Ptr<T> {}

impl<T> Ptr<T> {
    #[inline(always)]
    pub fn wrapping_offset(self, offset: isize) -> Self {
        Ptr(self.0.wrapping_offset(offset))
    }

    #[inline(always)]
    pub fn wrapping_add(self, count: usize) -> Self {
        Ptr(self.0.wrapping_add(count))
    }
}
