//! Storage traits and error types
//!
//! This module defines the trait interface for the crawl state store and
//! associated error types.

use crate::model::Item;
use crate::state::PageState;
use crate::storage::YearTotal;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Storage failures are fatal: there is no safe way to continue a crawl
/// without durable checkpoints.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for the durable, resumable crawl state store
///
/// The store records which (year, page, order) units have been reconciled
/// and holds every captured item. All mutations become durable no later
/// than the next `checkpoint()` call.
pub trait StateStore {
    // ===== Cache metadata =====

    /// Timestamp of the last checkpoint, if the cache has ever been written
    fn last_modified(&self) -> StorageResult<Option<DateTime<Utc>>>;

    /// Durably flushes all recorded progress and stamps the cache as
    /// modified now. Safe to call after every page.
    fn checkpoint(&mut self) -> StorageResult<()>;

    // ===== Year bookkeeping =====

    /// Authoritative order total for a year, if one has been recorded
    fn order_count(&self, year: i32) -> StorageResult<Option<u32>>;

    /// Records the authoritative order total for a year
    fn set_order_count(&mut self, year: i32, count: u32) -> StorageResult<()>;

    /// Sum of all recorded per-year order totals
    fn total_order_count(&self) -> StorageResult<u64>;

    /// True once every page of the year has been reconciled
    fn year_checked(&self, year: i32) -> StorageResult<bool>;

    fn set_year_checked(&mut self, year: i32) -> StorageResult<()>;

    // ===== Page bookkeeping =====

    /// Lifecycle state of a (year, page) unit; `Unvisited` when unknown
    fn page_state(&self, year: i32, page: u32) -> StorageResult<PageState>;

    fn set_page_state(&mut self, year: i32, page: u32, state: PageState) -> StorageResult<()>;

    /// Drops all page marks for a year, forcing its pages to be re-walked
    fn clear_page_states(&mut self, year: i32) -> StorageResult<()>;

    /// True when the page is fully reconciled
    fn page_checked(&self, year: i32, page: u32) -> StorageResult<bool> {
        Ok(self.page_state(year, page)?.is_checked())
    }

    fn set_page_checked(&mut self, year: i32, page: u32) -> StorageResult<()> {
        self.set_page_state(year, page, PageState::Done)
    }

    // ===== Order bookkeeping =====

    /// True once every item of the order has been durably recorded
    fn order_captured(&self, order_no: &str) -> StorageResult<bool>;

    /// Marks an order captured. Callers must record the order's items
    /// first; the flag is the commit point for the whole order.
    fn set_order_captured(&mut self, order_no: &str) -> StorageResult<()>;

    /// Number of captured orders
    fn captured_order_count(&self) -> StorageResult<u64>;

    // ===== Item records =====

    /// Idempotent upsert keyed by (order_no, item_id); recording the same
    /// item twice must not duplicate it
    fn record_item(&mut self, item: &Item) -> StorageResult<()>;

    /// Most recently dated captured item for a year, if any
    fn last_item(&self, year: i32) -> StorageResult<Option<Item>>;

    /// All captured items in chronological order
    fn items(&self) -> StorageResult<Vec<Item>>;

    /// Number of captured items
    fn item_count(&self) -> StorageResult<u64>;

    /// Per-year item/order/spend totals over the captured items
    fn year_totals(&self) -> StorageResult<Vec<YearTotal>>;
}
