//! Error types for ItemDB core.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ItemDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] itemdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A journal record could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The commit journal is corrupted.
    #[error("journal corruption at offset {offset}: {message}")]
    JournalCorruption {
        /// Byte offset of the bad frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// The transaction observed its cancellation flag and stopped.
    #[error("operation cancelled")]
    Cancelled,

    /// A transaction body failed; the original fault is shared with every
    /// waiter and callback.
    #[error("transaction failed: {source}")]
    TransactionFailed {
        /// The fault raised inside the transaction.
        source: Arc<CoreError>,
    },

    /// A transaction body panicked.
    #[error("transaction panicked: {message}")]
    Panicked {
        /// The panic payload, when it was a string.
        message: String,
    },

    /// An internal invariant does not hold.
    #[error("consistency violation: {message}")]
    Consistency {
        /// Which invariant failed.
        message: String,
    },

    /// The item id is not a positive identifier.
    #[error("invalid item id {item}")]
    InvalidItem {
        /// The offending raw id.
        item: i64,
    },

    /// A value does not fit the attribute it is stored under.
    #[error("type mismatch on {attribute}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Attribute id.
        attribute: String,
        /// What the attribute accepts.
        expected: String,
        /// What was supplied or found.
        actual: String,
    },

    /// A mutation was attempted from a read transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// Database is already open or locked.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,
}

impl CoreError {
    /// Creates a consistency violation error.
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Wraps a fault raised inside a transaction body.
    pub fn transaction_failed(source: Arc<CoreError>) -> Self {
        Self::TransactionFailed { source }
    }

    /// Returns true if this is (or wraps) a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::TransactionFailed { source } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Returns true if this is (or wraps) a consistency violation.
    #[must_use]
    pub fn is_consistency(&self) -> bool {
        match self {
            Self::Consistency { .. } => true,
            Self::TransactionFailed { source } => source.is_consistency(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_display() {
        let err = CoreError::consistency("listener registered twice");
        assert_eq!(
            err.to_string(),
            "consistency violation: listener registered twice"
        );
    }

    #[test]
    fn wrapped_errors_keep_their_kind() {
        let inner = Arc::new(CoreError::consistency("bad event"));
        let err = CoreError::transaction_failed(inner);
        assert!(err.is_consistency());
        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("bad event"));
    }

    #[test]
    fn cancelled_is_recognized() {
        assert!(CoreError::Cancelled.is_cancelled());
    }

    #[test]
    fn checksum_display_is_hex() {
        let err = CoreError::ChecksumMismatch {
            expected: 0xdead_beef,
            actual: 0x0000_00ff,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch: expected deadbeef, got 000000ff"
        );
    }
}
