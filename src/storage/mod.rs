//! Storage module for persisting scrape output
//!
//! This module handles the SQLite side of persistence:
//! - database initialization and schema management
//! - upserting records and sellers, deduplicating listings by natural key
//! - row counts for statistics
//!
//! The [`StorageError`] type here is shared by the credential store and the
//! inventory ledger adapters.

mod schema;
mod sqlite;
mod traits;

pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite::{open_connection, SqliteListingStore};
pub use traits::{ListingStore, StorageError, StorageResult, StoreCounts, StoreSummary};

#[cfg(test)]
pub(crate) use sqlite::open_in_memory;

use std::io::Write;
use std::path::Path;

/// Opens the listing database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_listing_store(path: &Path) -> StorageResult<SqliteListingStore> {
    SqliteListingStore::open(path)
}

/// Replaces `path` with `bytes` through a temp file in the same directory
///
/// Readers never observe a half-written file. With `owner_only` the file is
/// mode 0600 on Unix from the moment it is created; otherwise it ends up 0644.
pub fn write_file_atomic(path: &Path, bytes: &[u8], owner_only: bool) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if owner_only { 0o600 } else { 0o644 };
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = owner_only;

    file.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}
