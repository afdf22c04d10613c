use thiserror::Error;

use crate::CacheKey;

/// Errors raised by the memoization engine itself.
///
/// Failures of the memoized computation are never wrapped in this type: they
/// are handed back to the caller unchanged by the `try_*` entry points.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoError {
    /// An argument could not be turned into a stable cache-key component.
    ///
    /// Raised before the store is touched, so nothing is cached and the
    /// computation is not run.
    ///
    /// # Fields
    ///
    /// * `position` - Zero-based index of the offending top-level argument
    /// * `reason` - Why the value could not be normalized
    #[error("argument #{position} cannot be used as a memoization key: {reason}")]
    InvalidArgument {
        /// Index of the argument in the supplied argument set
        position: usize,
        /// Human readable cause
        reason: String,
    },

    /// The cached value stored under `key` is not of the requested type.
    ///
    /// Happens when one call-site identifier is reused for computations that
    /// return different types.
    #[error("cached value for key {key} is not a `{expected}`")]
    TypeMismatch {
        /// Key of the conflicting entry
        key: CacheKey,
        /// Type the caller asked for
        expected: &'static str,
    },
}

impl MemoError {
    /// Builds an [`MemoError::InvalidArgument`] for a value that cannot be normalized.
    ///
    /// Intended for custom [`MemoArg`](crate::MemoArg) implementations. The
    /// position is filled in by [`normalize`](crate::normalize).
    pub fn unsupported(reason: impl Into<String>) -> Self {
        MemoError::InvalidArgument {
            position: 0,
            reason: reason.into(),
        }
    }

    pub(crate) fn at_position(self, position: usize) -> Self {
        match self {
            MemoError::InvalidArgument { reason, .. } => {
                MemoError::InvalidArgument { position, reason }
            }
            other => other,
        }
    }
}
