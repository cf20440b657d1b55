//! Storage error types.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a [`crate::StorageBackend`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A truncation asked to grow the medium.
    #[error("cannot truncate to {requested} bytes, medium holds {len}")]
    TruncateBeyondEnd {
        /// The requested length.
        requested: u64,
        /// The current length.
        len: u64,
    },
}
