//! File backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A backend writing to a single append-only file.
///
/// `sync` calls `File::sync_data`, which is what commit durability relies on.
///
/// ```no_run
/// use itemdb_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("journal.log")).unwrap();
/// backend.append(b"record").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: File,
    len: u64,
}

impl FileBackend {
    /// Opens the file at `path`, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.len;
        if data.is_empty() {
            return Ok(offset);
        }
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(data)?;
        self.len += data.len() as u64;
        Ok(offset)
    }

    fn read_all(&self) -> StorageResult<Vec<u8>> {
        // A second handle keeps reads independent of the append cursor.
        let mut reader = File::open(&self.path)?;
        let mut buffer = Vec::with_capacity(self.len as usize);
        reader.read_to_end(&mut buffer)?;
        buffer.truncate(self.len as usize);
        Ok(buffer)
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.len)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        if len > self.len {
            return Err(StorageError::TruncateBeyondEnd {
                requested: len,
                len: self.len,
            });
        }
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.len = len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"first").unwrap();
            backend.append(b"second").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.len().unwrap(), 11);
        assert_eq!(backend.read_all().unwrap(), b"firstsecond");
    }

    #[test]
    fn file_truncate_shrinks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"0123456789").unwrap();
        backend.truncate(4).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"0123");
        assert_eq!(backend.append(b"x").unwrap(), 4);
    }

    #[test]
    fn file_empty_append_is_noop() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("j")).unwrap();
        assert_eq!(backend.append(b"").unwrap(), 0);
        assert!(backend.is_empty().unwrap());
    }
}
