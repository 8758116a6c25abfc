//! Process-wide version source.
//!
//! Every structural change of any `MultiDict` takes the next value from a
//! single monotonic counter. A container's version therefore strictly
//! increases on each change, and no two containers ever report the same
//! version, so a `Cursor` captured on one map can never validate against
//! another.

use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// Take a fresh version number.
#[inline]
pub(crate) fn next() -> u64 {
    // Only uniqueness and monotonicity matter; no memory is published.
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}
