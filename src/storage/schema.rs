//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the orderhist cache.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Cache metadata (last-modified timestamp)
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Per-year order totals and reconciliation flags
CREATE TABLE IF NOT EXISTS years (
    year INTEGER PRIMARY KEY,
    order_count INTEGER,
    checked INTEGER NOT NULL DEFAULT 0
);

-- Per-(year, page) traversal state
CREATE TABLE IF NOT EXISTS pages (
    year INTEGER NOT NULL,
    page INTEGER NOT NULL,
    state TEXT NOT NULL DEFAULT 'unvisited',
    visited_at TEXT,
    PRIMARY KEY (year, page)
);

CREATE INDEX IF NOT EXISTS idx_pages_year ON pages(year);

-- Orders whose items have been durably captured
CREATE TABLE IF NOT EXISTS orders (
    order_no TEXT PRIMARY KEY,
    captured INTEGER NOT NULL DEFAULT 0,
    captured_at TEXT
);

-- Captured line items, keyed by (order_no, item_id)
CREATE TABLE IF NOT EXISTS items (
    order_no TEXT NOT NULL,
    item_id TEXT NOT NULL,
    name TEXT NOT NULL,
    price INTEGER NOT NULL,
    quantity INTEGER NOT NULL,
    url TEXT NOT NULL,
    category TEXT NOT NULL,
    thumbnail TEXT,
    seller TEXT NOT NULL,
    kind TEXT NOT NULL,
    ordered_at TEXT NOT NULL,
    year INTEGER NOT NULL,
    PRIMARY KEY (order_no, item_id)
);

CREATE INDEX IF NOT EXISTS idx_items_year ON items(year, ordered_at);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
