//! Inventory ledger
//!
//! Durable per-seller memory of the inventory item IDs seen on earlier runs.
//! The crawl engine stops at the first ID it finds here, and the ledger is
//! refreshed with everything observed once a run completes.
//!
//! The known-ID list is bounded: the most recent `capacity` IDs are kept and
//! older ones are evicted. A listing removed and re-added after more than
//! `capacity` other items have cycled through is reported as new again.
//!
//! Concurrent updates for the *same* username are not supported; each adapter
//! serializes its own read-modify-write, but two processes sharing one ledger
//! must not scrape the same seller at once.

mod json;
mod sqlite;

pub use json::JsonFileLedger;
pub use sqlite::SqliteLedger;

use crate::config::{LedgerBackend, StorageConfig};
use crate::storage::StorageResult;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Default number of known IDs kept per seller
pub const DEFAULT_CAPACITY: usize = 50;

/// What the ledger remembers about one seller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    /// Date of the last successful run
    #[serde(rename = "last_inventory", default)]
    pub last_seen_date: Option<NaiveDate>,

    /// Known item IDs, most recent first
    #[serde(rename = "record_ids", default)]
    pub known_item_ids: Vec<u64>,
}

impl InventorySnapshot {
    /// Whether this seller has never been scraped
    pub fn is_cold_start(&self) -> bool {
        self.last_seen_date.is_none() && self.known_item_ids.is_empty()
    }

    pub fn contains(&self, item_id: u64) -> bool {
        self.known_item_ids.contains(&item_id)
    }

    /// Known IDs as a set for fast lookups during a crawl
    pub fn id_set(&self) -> HashSet<u64> {
        self.known_item_ids.iter().copied().collect()
    }
}

/// Merges this run's IDs into the known list
///
/// The result is this run's IDs in the order given (duplicates dropped),
/// followed by previously known IDs not seen this run, truncated to
/// `capacity`.
pub fn merge_known_ids(new_ids: &[u64], existing: &[u64], capacity: usize) -> Vec<u64> {
    let mut seen = HashSet::with_capacity(new_ids.len() + existing.len());
    new_ids
        .iter()
        .chain(existing.iter())
        .copied()
        .filter(|id| seen.insert(*id))
        .take(capacity)
        .collect()
}

/// Today's date as stamped on updated snapshots
pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Per-seller store of known inventory IDs
pub trait InventoryLedger: Send + Sync {
    /// Snapshot for `username`; an empty snapshot when never scraped
    fn get(&self, username: &str) -> StorageResult<InventorySnapshot>;

    fn has_seen(&self, username: &str, item_id: u64) -> StorageResult<bool> {
        Ok(self.get(username)?.contains(item_id))
    }

    /// Merges `new_ids` into the snapshot, stamps today's date and persists it
    fn update(&self, username: &str, new_ids: &[u64]) -> StorageResult<InventorySnapshot>;
}

/// In-process ledger
#[derive(Debug)]
pub struct MemoryLedger {
    capacity: usize,
    snapshots: Mutex<HashMap<String, InventorySnapshot>>,
}

impl MemoryLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            snapshots: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InventoryLedger for MemoryLedger {
    fn get(&self, username: &str) -> StorageResult<InventorySnapshot> {
        Ok(self
            .snapshots
            .lock()
            .get(username)
            .cloned()
            .unwrap_or_default())
    }

    fn update(&self, username: &str, new_ids: &[u64]) -> StorageResult<InventorySnapshot> {
        let mut snapshots = self.snapshots.lock();
        let entry = snapshots.entry(username.to_string()).or_default();
        entry.known_item_ids = merge_known_ids(new_ids, &entry.known_item_ids, self.capacity);
        entry.last_seen_date = Some(today());
        Ok(entry.clone())
    }
}

/// Opens the ledger adapter selected by configuration
pub fn open_ledger(config: &StorageConfig) -> StorageResult<Arc<dyn InventoryLedger>> {
    let ledger: Arc<dyn InventoryLedger> = match config.ledger_backend {
        LedgerBackend::Json => Arc::new(JsonFileLedger::new(
            &config.ledger_path,
            config.ledger_capacity,
        )),
        LedgerBackend::Sqlite => Arc::new(SqliteLedger::open(
            Path::new(&config.database_path),
            config.ledger_capacity,
        )?),
    };
    Ok(ledger)
}
