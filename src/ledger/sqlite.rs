//! SQLite ledger, sharing the listing database

use crate::ledger::{merge_known_ids, today, InventoryLedger, InventorySnapshot};
use crate::storage::{open_connection, StorageError, StorageResult};
use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Ledger stored in the `inventory_snapshots` and `inventory_items` tables
pub struct SqliteLedger {
    conn: Mutex<Connection>,
    capacity: usize,
}

impl SqliteLedger {
    pub fn open(path: &Path, capacity: usize) -> StorageResult<Self> {
        Ok(Self::from_connection(open_connection(path)?, capacity))
    }

    pub fn from_connection(conn: Connection, capacity: usize) -> Self {
        Self {
            conn: Mutex::new(conn),
            capacity,
        }
    }
}

fn load_snapshot(conn: &Connection, username: &str) -> StorageResult<InventorySnapshot> {
    let date: Option<Option<String>> = conn
        .query_row(
            "SELECT last_inventory FROM inventory_snapshots WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .optional()?;

    let Some(date) = date else {
        return Ok(InventorySnapshot::default());
    };

    let last_seen_date = date
        .map(|d| {
            NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .map_err(|e| StorageError::Corrupt(format!("ledger date '{}': {}", d, e)))
        })
        .transpose()?;

    let mut stmt = conn.prepare(
        "SELECT item_id FROM inventory_items WHERE username = ?1 ORDER BY position",
    )?;
    let known_item_ids = stmt
        .query_map(params![username], |row| row.get::<_, i64>(0))?
        .map(|id| id.map(|id| id as u64))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(InventorySnapshot {
        last_seen_date,
        known_item_ids,
    })
}

impl InventoryLedger for SqliteLedger {
    fn get(&self, username: &str) -> StorageResult<InventorySnapshot> {
        let conn = self.conn.lock();
        load_snapshot(&conn, username)
    }

    fn update(&self, username: &str, new_ids: &[u64]) -> StorageResult<InventorySnapshot> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing = load_snapshot(&tx, username)?;
        let snapshot = InventorySnapshot {
            last_seen_date: Some(today()),
            known_item_ids: merge_known_ids(new_ids, &existing.known_item_ids, self.capacity),
        };

        tx.execute(
            "INSERT INTO inventory_snapshots (username, last_inventory) VALUES (?1, ?2)
             ON CONFLICT(username) DO UPDATE SET last_inventory = excluded.last_inventory",
            params![username, today().format("%Y-%m-%d").to_string()],
        )?;
        tx.execute(
            "DELETE FROM inventory_items WHERE username = ?1",
            params![username],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO inventory_items (username, position, item_id) VALUES (?1, ?2, ?3)",
            )?;
            for (position, id) in snapshot.known_item_ids.iter().enumerate() {
                insert.execute(params![username, position as i64, *id as i64])?;
            }
        }

        tx.commit()?;
        Ok(snapshot)
    }
}
