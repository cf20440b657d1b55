//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod version;

use itemdb_core::{Config, CoreError, Database};
use std::path::{Path, PathBuf};

/// Errors reported by CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The directory holds no journal.
    #[error("no database found at {}", .0.display())]
    NoDatabase(PathBuf),

    /// The database refused to open or a read failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Reading the journal file failed.
    #[error(transparent)]
    Storage(#[from] itemdb_storage::StorageError),

    /// JSON output failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Writing output failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Opens an existing database directory without creating anything.
pub fn open_existing(path: &Path) -> CliResult<Database> {
    let journal = path.join("journal.log");
    if !journal.exists() {
        return Err(CliError::NoDatabase(path.to_path_buf()));
    }
    let config = Config::new()
        .create_if_missing(false)
        .sync_on_commit(false)
        .thread_prefix("itemdb-cli");
    tracing::debug!(path = %path.display(), "opening database");
    Ok(Database::open_with_config(path, config)?)
}
