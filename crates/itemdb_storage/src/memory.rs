//! In-memory backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A backend holding its bytes in memory.
///
/// Clones share the same buffer, so a test can hand one clone to a database,
/// drop the database and reopen from another clone to exercise replay.
///
/// ```rust
/// use itemdb_storage::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let observer = backend.clone();
/// backend.append(b"abc").unwrap();
/// assert_eq!(observer.len().unwrap(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the buffer.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.snapshot())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let current = data.len() as u64;
        if len > current {
            return Err(StorageError::TruncateBeyondEnd {
                requested: len,
                len: current,
            });
        }
        data.truncate(len as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_backend_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.is_empty().unwrap());
        assert!(backend.read_all().unwrap().is_empty());
    }

    #[test]
    fn append_reports_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.read_all().unwrap(), b"hello world");
    }

    #[test]
    fn clones_share_the_buffer() {
        let mut writer = InMemoryBackend::new();
        let reader = writer.clone();
        writer.append(b"shared").unwrap();
        assert_eq!(reader.snapshot(), b"shared");
    }

    #[test]
    fn truncate_drops_the_tail() {
        let mut backend = InMemoryBackend::with_data(b"keep-drop".to_vec());
        backend.truncate(4).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"keep");
    }

    #[test]
    fn truncate_cannot_grow() {
        let mut backend = InMemoryBackend::with_data(b"abc".to_vec());
        let result = backend.truncate(10);
        assert!(matches!(
            result,
            Err(StorageError::TruncateBeyondEnd { requested: 10, len: 3 })
        ));
    }

    proptest! {
        #[test]
        fn appends_concatenate(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..16)) {
            let mut backend = InMemoryBackend::new();
            let mut expected = Vec::new();
            for chunk in &chunks {
                let offset = backend.append(chunk).unwrap();
                prop_assert_eq!(offset, expected.len() as u64);
                expected.extend_from_slice(chunk);
            }
            prop_assert_eq!(backend.read_all().unwrap(), expected);
        }
    }
}
