//! Error taxonomy (spec §7).
//!
//! Shape errors are unrecoverable caller bugs and short-circuit before any
//! memory is touched. Hardware-path errors never reach here: they are
//! resolved once, at dispatch setup, into a fallback function pointer.

use thiserror::Error;

/// Every fallible outcome the core surfaces to a caller.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GemmError {
    /// An input slice was shorter than its declared `rows * cols`.
    #[error("dimension mismatch: {what} needs at least {needed} elements, got {got}")]
    DimensionMismatch {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    /// A [`crate::cache::CacheParams`] invariant was violated at construction.
    #[error("cache params invariant violated: {reason}")]
    PanelMisalignment { reason: &'static str },

    /// An ISA path was selected but the feature it requires is not
    /// available on this host. Callers never observe this directly: the
    /// dispatcher substitutes the portable fallback pointer instead, but
    /// the variant exists so that init-time probing can report it.
    #[error("hardware path `{path}` unavailable on this host")]
    HardwareUnavailable { path: &'static str },

    /// An operation was attempted on a [`crate::pool::WorkerPool`] after
    /// [`crate::pool::WorkerPool::close`].
    #[error("worker pool is closed")]
    WorkerPoolClosed,
}

pub type Result<T> = core::result::Result<T, GemmError>;

/// Fail fast if `slice.len() < rows * cols`. Called before any memory in
/// `slice` is read or written.
#[inline]
pub fn check_dims(what: &'static str, slice_len: usize, rows: usize, cols: usize) -> Result<()> {
    let needed = rows.saturating_mul(cols);
    if slice_len < needed {
        Err(GemmError::DimensionMismatch {
            what,
            needed,
            got: slice_len,
        })
    } else {
        Ok(())
    }
}
