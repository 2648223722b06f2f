//! Storage layer for ragtier
//!
//! SQLite is the source of truth for documents; vector indexes are derived
//! from it when the engine opens.

pub mod database;

use crate::error::{RagtierError, Result};
use std::path::{Path, PathBuf};

pub use database::{Database, DbPool, IndexMeta};

/// File name of the document database inside the store directory
pub const DB_FILE_NAME: &str = "ragtier.sqlite";

/// Location of the document database for a data directory
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("store").join(DB_FILE_NAME)
}

/// Open (or create) the document database under `data_dir`.
///
/// Fails with `UpstreamUnavailable` when the store cannot be created or read.
pub fn open_database(data_dir: &Path) -> Result<Database> {
    let store_dir = data_dir.join("store");
    std::fs::create_dir_all(&store_dir).map_err(|e| {
        RagtierError::UpstreamUnavailable(format!(
            "Failed to create store directory {}: {}",
            store_dir.display(),
            e
        ))
    })?;
    Database::new(&db_path(data_dir))
}
