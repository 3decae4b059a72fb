//! SQLite storage implementation
//!
//! This module provides the SQLite-based implementation of the StateStore
//! trait.

use crate::model::{Item, OrderKind};
use crate::state::PageState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StateStore, StorageError, StorageResult};
use crate::storage::YearTotal;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// Storage format for item timestamps; lexicographic order matches
/// chronological order.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ITEM_COLUMNS: &str = "order_no, item_id, name, price, quantity, url, \
                            category, thumbnail, seller, kind, ordered_at";

/// SQLite-backed crawl state store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens or creates the cache database at the given path
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory store (for tests)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Raw item row before category/kind/timestamp decoding
struct RawItem {
    order_no: String,
    item_id: String,
    name: String,
    price: i64,
    quantity: u32,
    url: String,
    category: String,
    thumbnail: Option<String>,
    seller: String,
    kind: String,
    ordered_at: String,
}

fn read_raw_item(row: &Row) -> rusqlite::Result<RawItem> {
    Ok(RawItem {
        order_no: row.get(0)?,
        item_id: row.get(1)?,
        name: row.get(2)?,
        price: row.get(3)?,
        quantity: row.get(4)?,
        url: row.get(5)?,
        category: row.get(6)?,
        thumbnail: row.get(7)?,
        seller: row.get(8)?,
        kind: row.get(9)?,
        ordered_at: row.get(10)?,
    })
}

fn decode_item(raw: RawItem) -> StorageResult<Item> {
    let category: Vec<String> = serde_json::from_str(&raw.category)
        .map_err(|e| StorageError::Serialization(format!("category of {}: {}", raw.item_id, e)))?;

    let kind = OrderKind::from_db_string(&raw.kind).ok_or_else(|| {
        StorageError::Corrupt(format!("unknown order kind '{}' on {}", raw.kind, raw.order_no))
    })?;

    let ordered_at = NaiveDateTime::parse_from_str(&raw.ordered_at, DATETIME_FORMAT)
        .map_err(|e| StorageError::Corrupt(format!("timestamp on {}: {}", raw.order_no, e)))?;

    Ok(Item {
        item_id: raw.item_id,
        name: raw.name,
        price: raw.price,
        quantity: raw.quantity,
        url: raw.url,
        category,
        thumbnail: raw.thumbnail,
        order_no: raw.order_no,
        seller: raw.seller,
        kind,
        ordered_at,
    })
}

impl StateStore for SqliteStore {
    // ===== Cache metadata =====

    fn last_modified(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'last_modified'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(text) => {
                let parsed = text.parse::<DateTime<Utc>>().map_err(|e| {
                    StorageError::Corrupt(format!("last_modified timestamp: {}", e))
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    fn checkpoint(&mut self) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES ('last_modified', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![now],
        )?;

        // Push WAL contents into the main database file.
        self.conn
            .query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_row| Ok(()))?;

        Ok(())
    }

    // ===== Year bookkeeping =====

    fn order_count(&self, year: i32) -> StorageResult<Option<u32>> {
        let count: Option<Option<u32>> = self
            .conn
            .query_row(
                "SELECT order_count FROM years WHERE year = ?1",
                params![year],
                |row| row.get(0),
            )
            .optional()?;

        Ok(count.flatten())
    }

    fn set_order_count(&mut self, year: i32, count: u32) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO years (year, order_count) VALUES (?1, ?2)
             ON CONFLICT(year) DO UPDATE SET order_count = excluded.order_count",
            params![year, count],
        )?;
        Ok(())
    }

    fn total_order_count(&self) -> StorageResult<u64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(order_count), 0) FROM years",
            [],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    fn year_checked(&self, year: i32) -> StorageResult<bool> {
        let checked: Option<i32> = self
            .conn
            .query_row(
                "SELECT checked FROM years WHERE year = ?1",
                params![year],
                |row| row.get(0),
            )
            .optional()?;

        Ok(checked.unwrap_or(0) != 0)
    }

    fn set_year_checked(&mut self, year: i32) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO years (year, checked) VALUES (?1, 1)
             ON CONFLICT(year) DO UPDATE SET checked = 1",
            params![year],
        )?;
        Ok(())
    }

    // ===== Page bookkeeping =====

    fn page_state(&self, year: i32, page: u32) -> StorageResult<PageState> {
        let state: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM pages WHERE year = ?1 AND page = ?2",
                params![year, page],
                |row| row.get(0),
            )
            .optional()?;

        match state {
            Some(text) => PageState::from_db_string(&text).ok_or_else(|| {
                StorageError::Corrupt(format!("unknown page state '{}' for {}/{}", text, year, page))
            }),
            None => Ok(PageState::Unvisited),
        }
    }

    fn set_page_state(&mut self, year: i32, page: u32, state: PageState) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO pages (year, page, state, visited_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(year, page) DO UPDATE
             SET state = excluded.state, visited_at = excluded.visited_at",
            params![year, page, state.to_db_string(), now],
        )?;
        Ok(())
    }

    fn clear_page_states(&mut self, year: i32) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM pages WHERE year = ?1", params![year])?;
        Ok(())
    }

    // ===== Order bookkeeping =====

    fn order_captured(&self, order_no: &str) -> StorageResult<bool> {
        let captured: Option<i32> = self
            .conn
            .query_row(
                "SELECT captured FROM orders WHERE order_no = ?1",
                params![order_no],
                |row| row.get(0),
            )
            .optional()?;

        Ok(captured.unwrap_or(0) != 0)
    }

    fn set_order_captured(&mut self, order_no: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO orders (order_no, captured, captured_at) VALUES (?1, 1, ?2)
             ON CONFLICT(order_no) DO UPDATE
             SET captured = 1, captured_at = excluded.captured_at",
            params![order_no, now],
        )?;
        Ok(())
    }

    fn captured_order_count(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM orders WHERE captured = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Item records =====

    fn record_item(&mut self, item: &Item) -> StorageResult<()> {
        let category = serde_json::to_string(&item.category)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let ordered_at = item.ordered_at.format(DATETIME_FORMAT).to_string();

        self.conn.execute(
            "INSERT INTO items (order_no, item_id, name, price, quantity, url,
                                category, thumbnail, seller, kind, ordered_at, year)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(order_no, item_id) DO UPDATE SET
                 name = excluded.name,
                 price = excluded.price,
                 quantity = excluded.quantity,
                 url = excluded.url,
                 category = excluded.category,
                 thumbnail = excluded.thumbnail,
                 seller = excluded.seller,
                 kind = excluded.kind,
                 ordered_at = excluded.ordered_at,
                 year = excluded.year",
            params![
                item.order_no,
                item.item_id,
                item.name,
                item.price,
                item.quantity,
                item.url,
                category,
                item.thumbnail,
                item.seller,
                item.kind.to_db_string(),
                ordered_at,
                item.year(),
            ],
        )?;
        Ok(())
    }

    fn last_item(&self, year: i32) -> StorageResult<Option<Item>> {
        let sql = format!(
            "SELECT {} FROM items WHERE year = ?1 ORDER BY ordered_at DESC LIMIT 1",
            ITEM_COLUMNS
        );

        let raw = self
            .conn
            .query_row(&sql, params![year], read_raw_item)
            .optional()?;

        raw.map(decode_item).transpose()
    }

    fn items(&self) -> StorageResult<Vec<Item>> {
        let sql = format!(
            "SELECT {} FROM items ORDER BY ordered_at, order_no, item_id",
            ITEM_COLUMNS
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let raws = stmt
            .query_map([], read_raw_item)?
            .collect::<Result<Vec<_>, _>>()?;

        raws.into_iter().map(decode_item).collect()
    }

    fn item_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn year_totals(&self) -> StorageResult<Vec<YearTotal>> {
        let mut stmt = self.conn.prepare(
            "SELECT year, COUNT(*), COUNT(DISTINCT order_no),
                    COALESCE(SUM(price * quantity), 0)
             FROM items GROUP BY year ORDER BY year",
        )?;

        let totals = stmt
            .query_map([], |row| {
                Ok(YearTotal {
                    year: row.get(0)?,
                    items: row.get::<_, i64>(1)? as u64,
                    orders: row.get::<_, i64>(2)? as u64,
                    spend: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_item(order_no: &str, item_id: &str, date: (i32, u32, u32)) -> Item {
        Item {
            item_id: item_id.to_string(),
            name: "Steel kettle 1.2L".to_string(),
            price: 3480,
            quantity: 1,
            url: format!("https://store.example.com/shop/{}.html", item_id),
            category: vec!["Kitchen".to_string(), "Kettles".to_string()],
            thumbnail: None,
            order_no: order_no.to_string(),
            seller: "shop".to_string(),
            kind: OrderKind::Normal,
            ordered_at: NaiveDate::from_ymd_opt(date.0, date.1, date.2)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStore::new_in_memory().is_ok());
    }

    #[test]
    fn test_record_item_is_idempotent() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let item = sample_item("shop-1", "shop_a1", (2022, 3, 14));

        store.record_item(&item).unwrap();
        store.record_item(&item).unwrap();

        assert_eq!(store.item_count().unwrap(), 1);
        assert_eq!(store.items().unwrap(), vec![item]);
    }

    #[test]
    fn test_record_item_replaces_fields() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let mut item = sample_item("shop-1", "shop_a1", (2022, 3, 14));
        store.record_item(&item).unwrap();

        item.price = 2980;
        item.thumbnail = Some("thumb/shop_a1.png".to_string());
        store.record_item(&item).unwrap();

        let stored = store.items().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].price, 2980);
        assert_eq!(stored[0].thumbnail.as_deref(), Some("thumb/shop_a1.png"));
    }

    #[test]
    fn test_order_count_roundtrip() {
        let mut store = SqliteStore::new_in_memory().unwrap();

        assert_eq!(store.order_count(2022).unwrap(), None);

        store.set_order_count(2022, 45).unwrap();
        assert_eq!(store.order_count(2022).unwrap(), Some(45));

        store.set_order_count(2022, 47).unwrap();
        assert_eq!(store.order_count(2022).unwrap(), Some(47));
    }

    #[test]
    fn test_total_order_count() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        store.set_order_count(2021, 12).unwrap();
        store.set_order_count(2022, 45).unwrap();

        assert_eq!(store.total_order_count().unwrap(), 57);
    }

    #[test]
    fn test_year_checked_flag() {
        let mut store = SqliteStore::new_in_memory().unwrap();

        assert!(!store.year_checked(2022).unwrap());

        store.set_order_count(2022, 45).unwrap();
        store.set_year_checked(2022).unwrap();

        assert!(store.year_checked(2022).unwrap());
        // Checking must not clobber the recorded count.
        assert_eq!(store.order_count(2022).unwrap(), Some(45));
    }

    #[test]
    fn test_page_state_lifecycle() {
        let mut store = SqliteStore::new_in_memory().unwrap();

        assert_eq!(store.page_state(2022, 1).unwrap(), PageState::Unvisited);
        assert!(!store.page_checked(2022, 1).unwrap());

        store
            .set_page_state(2022, 1, PageState::InProgress)
            .unwrap();
        assert!(!store.page_checked(2022, 1).unwrap());

        store.set_page_checked(2022, 1).unwrap();
        assert!(store.page_checked(2022, 1).unwrap());
    }

    #[test]
    fn test_clear_page_states() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        store.set_page_checked(2022, 1).unwrap();
        store.set_page_checked(2022, 2).unwrap();
        store.set_page_checked(2021, 1).unwrap();

        store.clear_page_states(2022).unwrap();

        assert!(!store.page_checked(2022, 1).unwrap());
        assert!(!store.page_checked(2022, 2).unwrap());
        assert!(store.page_checked(2021, 1).unwrap());
    }

    #[test]
    fn test_order_captured_flag() {
        let mut store = SqliteStore::new_in_memory().unwrap();

        assert!(!store.order_captured("shop-1").unwrap());

        store.set_order_captured("shop-1").unwrap();
        assert!(store.order_captured("shop-1").unwrap());
        assert_eq!(store.captured_order_count().unwrap(), 1);

        // Marking twice is harmless.
        store.set_order_captured("shop-1").unwrap();
        assert_eq!(store.captured_order_count().unwrap(), 1);
    }

    #[test]
    fn test_last_item_returns_most_recent() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        store
            .record_item(&sample_item("shop-1", "shop_a1", (2022, 3, 14)))
            .unwrap();
        store
            .record_item(&sample_item("shop-2", "shop_b2", (2022, 11, 2)))
            .unwrap();
        store
            .record_item(&sample_item("other-9", "other_z9", (2021, 12, 30)))
            .unwrap();

        let last = store.last_item(2022).unwrap().unwrap();
        assert_eq!(last.order_no, "shop-2");

        assert!(store.last_item(2020).unwrap().is_none());
    }

    #[test]
    fn test_checkpoint_stamps_last_modified() {
        let mut store = SqliteStore::new_in_memory().unwrap();

        assert!(store.last_modified().unwrap().is_none());

        store.checkpoint().unwrap();
        let stamped = store.last_modified().unwrap();
        assert!(stamped.is_some());
    }

    #[test]
    fn test_year_totals() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        store
            .record_item(&sample_item("shop-1", "shop_a1", (2022, 3, 14)))
            .unwrap();
        store
            .record_item(&sample_item("shop-1", "shop_a2", (2022, 3, 14)))
            .unwrap();
        store
            .record_item(&sample_item("other-9", "other_z9", (2021, 12, 30)))
            .unwrap();

        let totals = store.year_totals().unwrap();
        assert_eq!(totals.len(), 2);

        assert_eq!(totals[0].year, 2021);
        assert_eq!(totals[0].items, 1);

        assert_eq!(totals[1].year, 2022);
        assert_eq!(totals[1].items, 2);
        assert_eq!(totals[1].orders, 1);
        assert_eq!(totals[1].spend, 3480 * 2);
    }
}
