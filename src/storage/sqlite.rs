//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ListingStore trait.

use crate::crawler::{QualifyingListing, ScrapeResult};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ListingStore, StorageResult, StoreCounts, StoreSummary};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, Transaction};
use std::path::Path;

/// Opens (creating if needed) a database and initializes the schema
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_connection(path: &Path) -> StorageResult<Connection> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}

/// Opens an in-memory database with the schema applied (for testing)
#[cfg(test)]
pub(crate) fn open_in_memory() -> StorageResult<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    initialize_schema(&conn)?;
    Ok(conn)
}

/// SQLite listing store
pub struct SqliteListingStore {
    conn: Mutex<Connection>,
}

impl SqliteListingStore {
    /// Opens the listing database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        Ok(Self::from_connection(open_connection(path)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        Ok(Self::from_connection(open_in_memory()?))
    }
}

/// Inserts or refreshes the release row and returns its id
fn upsert_record(tx: &Transaction<'_>, listing: &QualifyingListing) -> StorageResult<i64> {
    let now = Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO records (release_id, artist, title, label, catalog_number, formats,
                              genres, styles, year, wants, haves, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(release_id) DO UPDATE SET
             artist = excluded.artist,
             title = excluded.title,
             label = excluded.label,
             catalog_number = excluded.catalog_number,
             formats = excluded.formats,
             genres = excluded.genres,
             styles = excluded.styles,
             year = excluded.year,
             wants = excluded.wants,
             haves = excluded.haves,
             updated_at = excluded.updated_at",
        params![
            listing.release_id as i64,
            listing.artist,
            listing.title,
            listing.label,
            listing.catalog_number,
            serde_json::to_string(&listing.formats)?,
            serde_json::to_string(&listing.genres)?,
            serde_json::to_string(&listing.styles)?,
            listing.year,
            listing.wants,
            listing.haves,
            now,
        ],
    )?;

    let id = tx.query_row(
        "SELECT id FROM records WHERE release_id = ?1",
        params![listing.release_id as i64],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Inserts or refreshes the seller row and returns its id
fn upsert_seller(tx: &Transaction<'_>, listing: &QualifyingListing) -> StorageResult<i64> {
    let now = Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO sellers (name, currency, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET
             currency = excluded.currency,
             updated_at = excluded.updated_at",
        params![listing.seller, listing.currency, now],
    )?;

    let id = tx.query_row(
        "SELECT id FROM sellers WHERE name = ?1",
        params![listing.seller],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Stores one listing in its own transaction; `true` when newly inserted
fn store_listing(conn: &mut Connection, listing: &QualifyingListing) -> StorageResult<bool> {
    let tx = conn.transaction()?;

    let record_id = upsert_record(&tx, listing)?;
    let seller_id = upsert_seller(&tx, listing)?;

    let inserted = tx.execute(
        "INSERT OR IGNORE INTO listings (listing_id, seller_id, record_id, price, condition,
                                         sleeve_condition, suggested_price, scraped_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            listing.listing_id as i64,
            seller_id,
            record_id,
            listing.price,
            listing.condition,
            listing.sleeve_condition,
            listing.suggested_price,
            listing.scraped_at.to_rfc3339(),
        ],
    )?;

    tx.commit()?;
    Ok(inserted > 0)
}

impl ListingStore for SqliteListingStore {
    fn store_result(&self, result: &ScrapeResult) -> StorageResult<StoreSummary> {
        let mut conn = self.conn.lock();
        let mut summary = StoreSummary::default();

        for listing in &result.listings {
            match store_listing(&mut conn, listing) {
                Ok(true) => summary.inserted += 1,
                Ok(false) => summary.duplicates += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to store listing {} ({} - {}): {}",
                        listing.listing_id,
                        listing.artist,
                        listing.title,
                        e
                    );
                    summary.failed += 1;
                }
            }
        }

        tracing::debug!(
            "Stored listings for {}: {} new, {} duplicate, {} failed",
            result.username,
            summary.inserted,
            summary.duplicates,
            summary.failed
        );

        Ok(summary)
    }

    fn counts(&self) -> StorageResult<StoreCounts> {
        let conn = self.conn.lock();
        let count = |table: &str| -> StorageResult<u64> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as u64)
        };

        Ok(StoreCounts {
            listings: count("listings")?,
            records: count("records")?,
            sellers: count("sellers")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::test_support::sample_listing;

    fn result_with(listings: Vec<QualifyingListing>) -> ScrapeResult {
        ScrapeResult {
            username: "shop".to_string(),
            total_qualifying: listings.len(),
            new_qualifying: listings.len(),
            listings,
            success: true,
            error_detail: None,
        }
    }

    #[test]
    fn test_create_in_memory() {
        let store = SqliteListingStore::new_in_memory().unwrap();
        assert_eq!(store.counts().unwrap(), StoreCounts::default());
    }

    #[test]
    fn test_store_result_counts_rows() {
        let store = SqliteListingStore::new_in_memory().unwrap();

        let mut second = sample_listing(2);
        second.release_id = 200;
        second.seller = "other".to_string();

        let summary = store
            .store_result(&result_with(vec![sample_listing(1), second]))
            .unwrap();

        assert_eq!(summary.inserted, 2);
        let counts = store.counts().unwrap();
        assert_eq!(counts.listings, 2);
        assert_eq!(counts.records, 2);
        assert_eq!(counts.sellers, 2);
    }

    #[test]
    fn test_duplicate_natural_key_is_not_reinserted() {
        let store = SqliteListingStore::new_in_memory().unwrap();

        store
            .store_result(&result_with(vec![sample_listing(1)]))
            .unwrap();

        // Same seller, release, price and condition under a new listing ID
        let summary = store
            .store_result(&result_with(vec![sample_listing(99)]))
            .unwrap();

        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(store.counts().unwrap().listings, 1);
    }

    #[test]
    fn test_record_metadata_refreshed() {
        let store = SqliteListingStore::new_in_memory().unwrap();

        store
            .store_result(&result_with(vec![sample_listing(1)]))
            .unwrap();

        let mut updated = sample_listing(2);
        updated.wants = 500;
        updated.price = 30.0;
        store.store_result(&result_with(vec![updated])).unwrap();

        let conn = store.conn.lock();
        let wants: i64 = conn
            .query_row("SELECT wants FROM records WHERE release_id = ?1", [100], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(wants, 500);
        drop(conn);

        assert_eq!(store.counts().unwrap().records, 1);
        assert_eq!(store.counts().unwrap().listings, 2);
    }
}
