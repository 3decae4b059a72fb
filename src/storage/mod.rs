//! Storage module for persisting crawl state
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite cache initialization and schema management
//! - Year/page/order reconciliation flags
//! - Idempotent captured-item records
//! - Checkpointing and resumption support

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{StateStore, StorageError, StorageResult};

use std::path::Path;

/// Opens or creates the cache database at the given path
pub fn open_store(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path)
}

/// Per-year totals over the captured items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearTotal {
    pub year: i32,
    /// Number of captured items
    pub items: u64,
    /// Number of distinct orders those items belong to
    pub orders: u64,
    /// Sum of price x quantity, in integer currency units
    pub spend: i64,
}
