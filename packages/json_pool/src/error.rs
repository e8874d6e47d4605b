use thiserror::Error;

/// Errors reported by [`JsonDocument`][crate::JsonDocument] and by
/// [`MemoryPool::shrink_to_fit()`][crate::MemoryPool::shrink_to_fit].
///
/// Exhaustion inside the pool itself is additionally recorded in the sticky
/// [`overflowed()`][crate::MemoryPool::overflowed] flag.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The pool did not have enough free bytes to satisfy an allocation.
    #[error("memory pool exhausted: {requested} more bytes were needed")]
    PoolExhausted {
        /// Number of bytes the failed allocation asked for.
        requested: usize,
    },

    /// The allocator refused to reallocate the pool buffer while shrinking it.
    ///
    /// The pool is left exactly as it was before the shrink was attempted.
    #[error("allocator refused to reallocate the pool buffer to {requested} bytes")]
    ReallocationFailed {
        /// The capacity the pool attempted to shrink to.
        requested: usize,
    },

    /// An operation expected a variant of a different kind.
    #[error("expected {expected} but the variant holds {actual}")]
    TypeMismatch {
        /// The kind of variant the operation works on.
        expected: &'static str,

        /// The kind of variant that was found.
        actual: &'static str,
    },

    /// An object member key was a null string.
    #[error("object member keys cannot be null")]
    NullKey,
}

/// A specialized `Result` type for pool and document operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn messages_name_the_numbers() {
        let error = Error::PoolExhausted { requested: 24 };
        assert_eq!(
            error.to_string(),
            "memory pool exhausted: 24 more bytes were needed"
        );

        let error = Error::ReallocationFailed { requested: 64 };
        assert!(error.to_string().contains("64 bytes"));
    }

    #[test]
    fn type_mismatch_names_both_kinds() {
        let error = Error::TypeMismatch {
            expected: "array",
            actual: "string",
        };

        assert_eq!(error.to_string(), "expected array but the variant holds string");
    }
}
