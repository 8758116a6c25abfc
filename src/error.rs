//! Error kinds reported by `MultiDict` and its capability table.

use std::collections::TryReserveError;

/// Failure of a `MultiDict` operation.
///
/// Errors are reported to the immediate caller and never retried
/// internally. A failed operation leaves the container exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Lookup, pop or delete on a key with no live entry.
    #[error("key not found")]
    KeyNotFound,
    /// `pop_item` on a container without live entries.
    #[error("pop_item from an empty multidict")]
    EmptyContainer,
    /// A cursor observed a structural change made after it was created.
    #[error("multidict changed during iteration")]
    ConcurrentModification,
    /// A capability-table receiver was not the expected container type.
    #[error("object should be a {expected} instance")]
    TypeMismatch { expected: &'static str },
    /// Growing the entry store or the index failed.
    #[error("memory allocation failed while growing the multidict")]
    OutOfMemory,
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

impl From<hashbrown::TryReserveError> for Error {
    fn from(_: hashbrown::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn reserve_failures_map_to_out_of_memory() {
        let mut v: Vec<u64> = Vec::new();
        let err = v.try_reserve(usize::MAX).unwrap_err();
        assert_eq!(Error::from(err), Error::OutOfMemory);
    }

    #[test]
    fn type_mismatch_names_expected_type() {
        let e = Error::TypeMismatch {
            expected: "MultiDict",
        };
        assert_eq!(e.to_string(), "object should be a MultiDict instance");
    }
}
