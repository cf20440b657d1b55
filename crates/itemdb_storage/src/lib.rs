//! # ItemDB Storage
//!
//! Append-only byte media for the ItemDB commit journal.
//!
//! A backend never interprets what it stores. The core crate frames, checksums
//! and decodes journal records; a backend only has to keep bytes in order and
//! make them durable on request.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral databases and tests; clones share one buffer
//! - [`FileBackend`] - a single append-only file
//!
//! ## Example
//!
//! ```rust
//! use itemdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(offset, 0);
//! assert_eq!(backend.read_all().unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
