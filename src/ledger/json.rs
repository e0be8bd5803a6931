//! JSON file ledger
//!
//! The whole ledger is one JSON object mapping username to snapshot:
//!
//! ```json
//! { "some_seller": { "last_inventory": "2024-03-01", "record_ids": [3, 2, 1] } }
//! ```

use crate::ledger::{merge_known_ids, today, InventoryLedger, InventorySnapshot};
use crate::storage::{write_file_atomic, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

type LedgerFile = BTreeMap<String, InventorySnapshot>;

/// Ledger kept in a single JSON file
#[derive(Debug)]
pub struct JsonFileLedger {
    path: PathBuf,
    capacity: usize,
    // Held across read-modify-write so updates from this process never interleave
    lock: Mutex<()>,
}

impl JsonFileLedger {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> StorageResult<LedgerFile> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LedgerFile::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(LedgerFile::new());
        }

        Ok(serde_json::from_str(&content)?)
    }

    /// Where an unreadable ledger is moved before it is rewritten
    pub fn corrupt_backup_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".corrupt");
        PathBuf::from(name)
    }

    /// Reads the ledger for a rewrite, setting aside a file that no longer parses
    fn read_for_update(&self) -> StorageResult<LedgerFile> {
        match self.read_all() {
            Err(StorageError::Serialization(e)) => {
                let backup = self.corrupt_backup_path();
                tracing::warn!(
                    "Ledger {} is unreadable ({}), moving it to {} and starting fresh",
                    self.path.display(),
                    e,
                    backup.display()
                );
                std::fs::rename(&self.path, &backup)?;
                Ok(LedgerFile::new())
            }
            other => other,
        }
    }
}

impl InventoryLedger for JsonFileLedger {
    fn get(&self, username: &str) -> StorageResult<InventorySnapshot> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(username).unwrap_or_default())
    }

    fn update(&self, username: &str, new_ids: &[u64]) -> StorageResult<InventorySnapshot> {
        let _guard = self.lock.lock();

        let mut all = self.read_for_update()?;
        let snapshot = all.entry(username.to_string()).or_default();
        snapshot.known_item_ids =
            merge_known_ids(new_ids, &snapshot.known_item_ids, self.capacity);
        snapshot.last_seen_date = Some(today());
        let updated = snapshot.clone();

        let json = serde_json::to_vec_pretty(&all)?;
        write_file_atomic(&self.path, &json, false)?;

        tracing::debug!(
            "Ledger for {} now holds {} IDs",
            username,
            updated.known_item_ids.len()
        );
        Ok(updated)
    }
}
