//! Storage traits and error types
//!
//! This module defines the trait interface for the listing store and the
//! error type shared by every persisted piece of state (credential, ledger,
//! listings).

use crate::crawler::ScrapeResult;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt stored data: {0}")]
    Corrupt(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of storing one scrape result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSummary {
    /// Listings inserted for the first time
    pub inserted: usize,

    /// Listings already present under the same natural key
    pub duplicates: usize,

    /// Listings that could not be stored
    pub failed: usize,
}

/// Row totals used for statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub listings: u64,
    pub records: u64,
    pub sellers: u64,
}

/// Persistence boundary for qualifying listings
///
/// Implementations upsert records and sellers and deduplicate listings by
/// (seller, record, price, condition).
pub trait ListingStore: Send + Sync {
    /// Stores every listing of a scrape result
    ///
    /// A listing that fails to store is counted in
    /// [`StoreSummary::failed`]; it does not abort the rest.
    fn store_result(&self, result: &ScrapeResult) -> StorageResult<StoreSummary>;

    /// Current row totals
    fn counts(&self) -> StorageResult<StoreCounts>;
}
