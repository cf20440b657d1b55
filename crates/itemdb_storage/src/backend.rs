//! The backend trait.

use crate::error::StorageResult;

/// An append-only byte medium.
///
/// # Invariants
///
/// - `append` returns the offset at which the data starts
/// - `read_all` returns every byte appended and not truncated, in order
/// - after `sync` returns, appended bytes survive process termination
///
/// Backends are `Send + Sync` so the journal can be owned by the database
/// and written from the main worker thread.
pub trait StorageBackend: Send + Sync {
    /// Appends `data` and returns the offset where it begins.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium rejects the write.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Reads the whole medium.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be read.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Current length in bytes, which is also the next append offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true when nothing has been appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Makes every appended byte durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush to stable storage fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Cuts the medium back to `len` bytes.
    ///
    /// Used to drop a torn trailing record after a crash.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncateBeyondEnd`] if `len` exceeds the
    /// current length.
    fn truncate(&mut self, len: u64) -> StorageResult<()>;
}
