//! Database schema definitions
//!
//! One SQLite file holds the stored listings and, when the SQLite ledger
//! backend is selected, the inventory ledger.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Releases seen in qualifying listings
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    release_id INTEGER NOT NULL UNIQUE,
    artist TEXT NOT NULL,
    title TEXT NOT NULL,
    label TEXT NOT NULL,
    catalog_number TEXT NOT NULL,
    formats TEXT NOT NULL,
    genres TEXT NOT NULL,
    styles TEXT NOT NULL,
    year INTEGER,
    wants INTEGER NOT NULL DEFAULT 0,
    haves INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

-- Marketplace sellers
CREATE TABLE IF NOT EXISTS sellers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    currency TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Individual listings, deduplicated by their natural key
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id INTEGER NOT NULL,
    seller_id INTEGER NOT NULL REFERENCES sellers(id),
    record_id INTEGER NOT NULL REFERENCES records(id),
    price REAL NOT NULL,
    condition TEXT NOT NULL,
    sleeve_condition TEXT NOT NULL,
    suggested_price TEXT,
    scraped_at TEXT NOT NULL,
    UNIQUE(seller_id, record_id, price, condition)
);

CREATE INDEX IF NOT EXISTS idx_listings_seller ON listings(seller_id);
CREATE INDEX IF NOT EXISTS idx_listings_record ON listings(record_id);

-- Inventory ledger: one row per seller
CREATE TABLE IF NOT EXISTS inventory_snapshots (
    username TEXT PRIMARY KEY,
    last_inventory TEXT
);

-- Inventory ledger: known item IDs, position 0 is the most recent
CREATE TABLE IF NOT EXISTS inventory_items (
    username TEXT NOT NULL REFERENCES inventory_snapshots(username),
    position INTEGER NOT NULL,
    item_id INTEGER NOT NULL,
    PRIMARY KEY (username, position)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
