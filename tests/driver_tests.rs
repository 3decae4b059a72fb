//! Integration tests for the crawl driver
//!
//! These tests run the full driver state machine against a scripted
//! in-memory page reader and assert on the resulting store contents and
//! the reader's navigation log.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use orderhist::crawler::{DiagnosticsSink, Driver};
use orderhist::model::{Item, LineItem, OrderDetail, OrderInfo, OrderKind};
use orderhist::reader::{CodeOutcome, LoginStep, NavError, NavResult, PageReader, PageSnapshot};
use orderhist::session::{CodePrompt, SessionProvider, LOGIN_RETRY_LIMIT};
use orderhist::storage::{SqliteStore, StateStore};
use orderhist::HistError;
use std::collections::{HashMap, HashSet};

// ===== Scripted page reader =====

/// Prompt that always supplies the same verification code
struct FixedPrompt;

impl CodePrompt for FixedPrompt {
    fn read_code(&mut self) -> std::io::Result<String> {
        Ok("123456".to_string())
    }
}

/// Scripted stand-in for the live resource
///
/// Holds a static model of the site plus a log of everything the driver
/// asked it to do.
#[derive(Default)]
struct MockReader {
    years: Vec<i32>,
    counts: HashMap<i32, u32>,
    pages: HashMap<(i32, u32), Vec<OrderInfo>>,
    details: HashMap<String, OrderDetail>,
    fail_open: HashSet<String>,
    logged_out: bool,
    reject_logins: usize,
    rate_limited: bool,

    // Navigation log
    home_navs: usize,
    page_navs: usize,
    opened: Vec<String>,
    login_attempts: usize,
    current: Option<(i32, u32)>,
}

impl PageReader for MockReader {
    async fn goto_history_home(&mut self) -> NavResult<()> {
        self.home_navs += 1;
        self.current = None;
        Ok(())
    }

    async fn read_year_list(&mut self) -> NavResult<Vec<i32>> {
        let mut years = self.years.clone();
        years.sort_unstable();
        Ok(years)
    }

    async fn goto_order_page(&mut self, year: i32, page: u32) -> NavResult<()> {
        self.page_navs += 1;
        self.current = Some((year, page));
        Ok(())
    }

    async fn read_order_count(&mut self) -> NavResult<u32> {
        let (year, _) = self.current.expect("no listing page open");
        self.counts.get(&year).copied().ok_or_else(|| NavError::Parse {
            target: "order listing".to_string(),
            message: format!("no order count scripted for {}", year),
        })
    }

    async fn read_order_rows(&mut self) -> NavResult<Vec<OrderInfo>> {
        let key = self.current.expect("no listing page open");
        Ok(self.pages.get(&key).cloned().unwrap_or_default())
    }

    async fn open_order(&mut self, order: &OrderInfo) -> NavResult<OrderDetail> {
        self.opened.push(order.order_no.clone());

        if self.fail_open.contains(&order.order_no) {
            return Err(NavError::Parse {
                target: "order detail".to_string(),
                message: format!("scripted failure opening {}", order.order_no),
            });
        }

        self.details
            .get(&order.order_no)
            .cloned()
            .ok_or_else(|| NavError::Parse {
                target: "order detail".to_string(),
                message: format!("no detail scripted for {}", order.order_no),
            })
    }

    async fn close_order(&mut self) -> NavResult<()> {
        Ok(())
    }

    async fn item_category(&mut self, _item_url: &str) -> NavResult<Vec<String>> {
        Ok(vec![
            "Home".to_string(),
            "Kitchen".to_string(),
            "Item name".to_string(),
        ])
    }

    async fn thumbnail(&mut self, _thumb_url: &str) -> NavResult<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn logged_out(&mut self) -> NavResult<bool> {
        Ok(self.logged_out)
    }

    async fn begin_login(&mut self, _user: &str) -> NavResult<LoginStep> {
        self.login_attempts += 1;
        if self.rate_limited {
            return Ok(LoginStep::RateLimited);
        }
        Ok(LoginStep::CodeSent)
    }

    async fn submit_code(&mut self, _code: &str) -> NavResult<CodeOutcome> {
        if self.reject_logins > 0 {
            self.reject_logins -= 1;
            return Ok(CodeOutcome::Rejected);
        }
        self.logged_out = false;
        Ok(CodeOutcome::LoggedIn)
    }

    async fn confirm_identity(&mut self, _mail: &str) -> NavResult<()> {
        Ok(())
    }

    async fn snapshot(&mut self) -> NavResult<PageSnapshot> {
        Ok(PageSnapshot {
            url: "mock://history".to_string(),
            source: "<html></html>".to_string(),
        })
    }
}

// ===== Fixtures =====

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at_noon(d: NaiveDate) -> NaiveDateTime {
    d.and_hms_opt(12, 0, 0).unwrap()
}

fn order(no: &str, d: NaiveDate) -> OrderInfo {
    OrderInfo {
        order_no: no.to_string(),
        seller: no.rsplit_once('-').unwrap().0.to_string(),
        date: d,
        kind: OrderKind::Normal,
        action: format!("openOrder('{}')", no),
    }
}

/// Builds a detail view with `n` line items for an order
fn detail(no: &str, at: NaiveDateTime, n: usize) -> OrderDetail {
    let seller = no.rsplit_once('-').unwrap().0;
    let lines = (0..n)
        .map(|k| LineItem {
            name: format!("Item {} of {}", k + 1, no),
            price: 1000 + k as i64,
            quantity: 1,
            url: format!("https://store.example.com/{}/{}-i{}.html", seller, no, k),
            thumb_url: String::new(),
        })
        .collect();
    OrderDetail { ordered_at: at, lines }
}

/// Minimal item record for pre-seeding the store
fn seeded_item(no: &str, item_id: &str, at: NaiveDateTime) -> Item {
    Item {
        item_id: item_id.to_string(),
        name: format!("Seeded {}", item_id),
        price: 2000,
        quantity: 1,
        url: format!("https://store.example.com/shop/{}.html", item_id),
        category: vec!["Kitchen".to_string()],
        thumbnail: None,
        order_no: no.to_string(),
        seller: no.rsplit_once('-').unwrap().0.to_string(),
        kind: OrderKind::Normal,
        ordered_at: at,
    }
}

fn make_driver(
    reader: MockReader,
    store: SqliteStore,
    dir: &tempfile::TempDir,
) -> Driver<MockReader, FixedPrompt> {
    let session = SessionProvider::new("0901234567", "user@example.com", FixedPrompt);
    let diagnostics = DiagnosticsSink::new(dir.path().join("debug"));
    Driver::new(
        reader,
        store,
        session,
        diagnostics,
        dir.path().join("thumb"),
        false,
    )
}

// ===== Tests =====

#[tokio::test]
async fn fresh_year_is_captured_completely() {
    let dir = tempfile::tempdir().unwrap();
    let d = date(2022, 6, 1);

    let mut reader = MockReader::default();
    reader.years = vec![2022];
    reader.counts.insert(2022, 3);
    reader.pages.insert(
        (2022, 1),
        vec![
            order("shopa-3", d),
            order("shopa-2", d),
            order("shopa-1", d),
        ],
    );
    for no in ["shopa-1", "shopa-2", "shopa-3"] {
        reader.details.insert(no.to_string(), detail(no, at_noon(d), 2));
    }

    let mut driver = make_driver(reader, SqliteStore::new_in_memory().unwrap(), &dir);
    driver.run().await.unwrap();

    let store = driver.store();
    assert_eq!(store.item_count().unwrap(), 6);
    assert_eq!(store.order_count(2022).unwrap(), Some(3));
    assert!(store.order_captured("shopa-1").unwrap());
    assert!(store.order_captured("shopa-2").unwrap());
    assert!(store.order_captured("shopa-3").unwrap());
    assert!(store.page_checked(2022, 1).unwrap());
    assert!(store.year_checked(2022).unwrap());
    assert!(store.last_modified().unwrap().is_some());

    // Categories arrive trimmed of their synthetic root/leaf entries.
    let items = store.items().unwrap();
    assert!(items.iter().all(|i| i.category == vec!["Kitchen".to_string()]));

    assert_eq!(driver.progress().count("orders/all"), 3);
}

#[tokio::test]
async fn checked_past_year_performs_no_page_navigation() {
    let dir = tempfile::tempdir().unwrap();
    let d = date(2022, 6, 1);

    // Prior run: year 2022 fully reconciled.
    let mut store = SqliteStore::new_in_memory().unwrap();
    store.set_order_count(2022, 1).unwrap();
    store
        .record_item(&seeded_item("shopa-1", "shopa_k1", at_noon(d)))
        .unwrap();
    store.set_order_captured("shopa-1").unwrap();
    store.set_page_checked(2022, 1).unwrap();
    store.set_year_checked(2022).unwrap();
    store.checkpoint().unwrap();
    let before = store.items().unwrap();

    let mut reader = MockReader::default();
    reader.years = vec![2022];
    // No counts or pages scripted: touching them would fail the run.

    let mut driver = make_driver(reader, store, &dir);
    driver.run().await.unwrap();

    assert_eq!(driver.reader().page_navs, 0);
    assert_eq!(driver.reader().home_navs, 1);
    assert!(driver.reader().opened.is_empty());

    // The final item collection is identical to the prior run's.
    assert_eq!(driver.store().items().unwrap(), before);

    // Counters still advance by the cached totals for reporting continuity.
    assert_eq!(driver.progress().count("orders/all"), 1);
}

#[tokio::test]
async fn current_year_count_is_always_refreshed() {
    let dir = tempfile::tempdir().unwrap();
    let year = Local::now().year();
    let old = date(year, 1, 15);
    let new = date(year, 1, 20);

    // Prior run captured shopc-1 and reconciled the year.
    let mut store = SqliteStore::new_in_memory().unwrap();
    store.set_order_count(year, 1).unwrap();
    store
        .record_item(&seeded_item("shopc-1", "shopc_k1", at_noon(old)))
        .unwrap();
    store.set_order_captured("shopc-1").unwrap();
    store.set_page_checked(year, 1).unwrap();
    store.set_year_checked(year).unwrap();
    store.checkpoint().unwrap();

    // Since then one order arrived; the live count differs from the cache.
    let mut reader = MockReader::default();
    reader.years = vec![year];
    reader.counts.insert(year, 2);
    reader
        .pages
        .insert((year, 1), vec![order("shopc-2", new), order("shopc-1", old)]);
    reader
        .details
        .insert("shopc-2".to_string(), detail("shopc-2", at_noon(new), 1));

    let mut driver = make_driver(reader, store, &dir);
    driver.run().await.unwrap();

    // The cached count was not trusted.
    assert_eq!(driver.store().order_count(year).unwrap(), Some(2));
    assert!(driver.reader().page_navs >= 1);

    // Only the new order was opened; the captured one was skipped.
    assert_eq!(driver.reader().opened, vec!["shopc-2".to_string()]);
    assert_eq!(driver.store().item_count().unwrap(), 2);
    assert!(driver.store().year_checked(year).unwrap());
}

#[tokio::test]
async fn fast_forward_marks_remaining_pages_without_visiting() {
    let dir = tempfile::tempdir().unwrap();
    let year = Local::now().year();
    let old = date(year, 1, 15);
    let new = date(year, 1, 20);

    // Prior run: 45 orders reconciled, newest captured item from shopa-100.
    let mut store = SqliteStore::new_in_memory().unwrap();
    store.set_order_count(year, 45).unwrap();
    store
        .record_item(&seeded_item("shopa-100", "shopa_k100", at_noon(old)))
        .unwrap();
    store.set_order_captured("shopa-100").unwrap();
    for page in 1..=3 {
        store.set_page_checked(year, page).unwrap();
    }
    store.set_year_checked(year).unwrap();
    store.checkpoint().unwrap();

    // Two new orders arrived since; the listing now spans 3 pages of 47.
    let mut reader = MockReader::default();
    reader.years = vec![year];
    reader.counts.insert(year, 47);

    let mut rows = vec![order("shopnew-2", new), order("shopnew-1", new)];
    rows.push(order("shopa-100", old));
    for k in 1..=17 {
        let no = format!("shopold-{}", k);
        rows.push(order(&no, old));
        store.set_order_captured(&no).unwrap();
    }
    reader.pages.insert((year, 1), rows);
    reader
        .details
        .insert("shopnew-2".to_string(), detail("shopnew-2", at_noon(new), 1));
    reader
        .details
        .insert("shopnew-1".to_string(), detail("shopnew-1", at_noon(new), 1));

    let mut driver = make_driver(reader, store, &dir);
    driver.run().await.unwrap();

    // One navigation for the live count, one for page 1. Pages 2 and 3
    // were marked checked by the fast-forward match, never visited.
    assert_eq!(driver.reader().page_navs, 2);
    assert_eq!(
        driver.reader().opened,
        vec!["shopnew-2".to_string(), "shopnew-1".to_string()]
    );

    let store = driver.store();
    for page in 1..=3 {
        assert!(store.page_checked(year, page).unwrap());
    }
    assert!(store.year_checked(year).unwrap());

    // Nothing older than the match point went missing.
    assert_eq!(store.item_count().unwrap(), 3);
    assert!(store.order_captured("shopa-100").unwrap());
}

#[tokio::test]
async fn partial_year_resumes_at_the_unchecked_page() {
    let dir = tempfile::tempdir().unwrap();
    let d = date(2022, 11, 20);

    // 45 orders over 3 pages; pages 1 and 2 were reconciled by a prior
    // run that stopped before page 3.
    let mut store = SqliteStore::new_in_memory().unwrap();
    store.set_order_count(2022, 45).unwrap();
    store.set_page_checked(2022, 1).unwrap();
    store.set_page_checked(2022, 2).unwrap();
    store.checkpoint().unwrap();

    let mut reader = MockReader::default();
    reader.years = vec![2022];
    let tail: Vec<OrderInfo> = (41..=45).map(|k| order(&format!("shopt-{}", k), d)).collect();
    for row in &tail {
        reader
            .details
            .insert(row.order_no.clone(), detail(&row.order_no, at_noon(d), 1));
    }
    reader.pages.insert((2022, 3), tail);

    let mut driver = make_driver(reader, store, &dir);
    driver.run().await.unwrap();

    // Only page 3 was visited; its five orders were fetched.
    assert_eq!(driver.reader().page_navs, 1);
    assert_eq!(driver.reader().opened.len(), 5);

    let store = driver.store();
    assert!(store.page_checked(2022, 3).unwrap());
    assert!(store.year_checked(2022).unwrap());
    assert_eq!(store.item_count().unwrap(), 5);
    assert_eq!(driver.progress().count("orders/2022"), 45);
}

#[tokio::test]
async fn login_failures_hit_the_retry_ceiling() {
    let dir = tempfile::tempdir().unwrap();

    let mut reader = MockReader::default();
    reader.years = vec![2022];
    reader.logged_out = true;
    reader.reject_logins = LOGIN_RETRY_LIMIT;

    let mut driver = make_driver(reader, SqliteStore::new_in_memory().unwrap(), &dir);
    let err = driver.run().await.unwrap_err();

    assert!(matches!(
        err,
        HistError::Session(orderhist::session::SessionError::LoginFailed { attempts })
            if attempts == LOGIN_RETRY_LIMIT
    ));
    assert_eq!(driver.reader().login_attempts, LOGIN_RETRY_LIMIT);
}

#[tokio::test]
async fn login_succeeds_within_the_retry_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let d = date(2022, 6, 1);

    let mut reader = MockReader::default();
    reader.years = vec![2022];
    reader.counts.insert(2022, 1);
    reader.pages.insert((2022, 1), vec![order("shopa-1", d)]);
    reader
        .details
        .insert("shopa-1".to_string(), detail("shopa-1", at_noon(d), 1));
    reader.logged_out = true;
    reader.reject_logins = LOGIN_RETRY_LIMIT - 1;

    let mut driver = make_driver(reader, SqliteStore::new_in_memory().unwrap(), &dir);
    driver.run().await.unwrap();

    assert_eq!(driver.reader().login_attempts, LOGIN_RETRY_LIMIT);
    assert_eq!(driver.store().item_count().unwrap(), 1);
}

#[tokio::test]
async fn rate_limited_login_fails_distinctly() {
    let dir = tempfile::tempdir().unwrap();

    let mut reader = MockReader::default();
    reader.years = vec![2022];
    reader.logged_out = true;
    reader.rate_limited = true;

    let mut driver = make_driver(reader, SqliteStore::new_in_memory().unwrap(), &dir);
    let err = driver.run().await.unwrap_err();

    assert!(matches!(
        err,
        HistError::Session(orderhist::session::SessionError::RateLimited)
    ));
    // A rate-limit refusal is not retried.
    assert_eq!(driver.reader().login_attempts, 1);
}

/// Documents the cached-page skip approximation (not a bug to fix): when a
/// year's order count is an exact multiple of the page size, the skip path
/// cannot tell the true final page from a full middle page, so the walk
/// runs one page past the end and fetches an empty listing.
#[tokio::test]
async fn skip_path_final_page_approximation() {
    let dir = tempfile::tempdir().unwrap();

    let mut store = SqliteStore::new_in_memory().unwrap();
    store.set_order_count(2022, 40).unwrap();
    store.set_page_checked(2022, 1).unwrap();
    store.set_page_checked(2022, 2).unwrap();
    store.checkpoint().unwrap();

    let mut reader = MockReader::default();
    reader.years = vec![2022];
    // Page 3 does not exist on the resource; the mock returns no rows.

    let mut driver = make_driver(reader, store, &dir);
    driver.run().await.unwrap();

    // Both real pages were skipped from cache, yet one navigation happened:
    // the phantom page 3 probe.
    assert_eq!(driver.reader().page_navs, 1);
    assert_eq!(driver.progress().count("orders/2022"), 40);
    assert!(driver.store().year_checked(2022).unwrap());
}

#[tokio::test]
async fn interrupted_capture_is_retried_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let d = date(2021, 6, 1);

    let build_reader = || {
        let mut reader = MockReader::default();
        reader.years = vec![2021];
        reader.counts.insert(2021, 2);
        reader.pages.insert(
            (2021, 1),
            vec![order("shopb-1", d), order("shopb-2", d)],
        );
        reader
            .details
            .insert("shopb-1".to_string(), detail("shopb-1", at_noon(d), 2));
        reader
            .details
            .insert("shopb-2".to_string(), detail("shopb-2", at_noon(d), 2));
        reader
    };

    // First run dies while opening the second order.
    let mut reader = build_reader();
    reader.fail_open.insert("shopb-2".to_string());

    let mut driver = make_driver(reader, SqliteStore::new_in_memory().unwrap(), &dir);
    let err = driver.run().await.unwrap_err();
    assert!(matches!(err, HistError::Nav(NavError::Parse { .. })));

    let (_, store) = driver.into_parts();

    // The checkpointed state is intact: the first order committed, the
    // page did not.
    assert!(store.order_captured("shopb-1").unwrap());
    assert!(!store.order_captured("shopb-2").unwrap());
    assert!(!store.page_checked(2021, 1).unwrap());
    assert!(!store.year_checked(2021).unwrap());
    assert_eq!(store.item_count().unwrap(), 2);

    // Second run resumes and completes; nothing is double-recorded.
    let mut driver = make_driver(build_reader(), store, &dir);
    driver.run().await.unwrap();

    assert_eq!(driver.reader().opened, vec!["shopb-2".to_string()]);
    assert_eq!(driver.store().item_count().unwrap(), 4);
    assert!(driver.store().order_captured("shopb-2").unwrap());
    assert!(driver.store().page_checked(2021, 1).unwrap());
    assert!(driver.store().year_checked(2021).unwrap());
}

#[tokio::test]
async fn empty_order_warns_but_does_not_abort() {
    let dir = tempfile::tempdir().unwrap();
    let d = date(2022, 6, 1);

    let mut reader = MockReader::default();
    reader.years = vec![2022];
    reader.counts.insert(2022, 1);
    reader.pages.insert((2022, 1), vec![order("shope-1", d)]);
    reader
        .details
        .insert("shope-1".to_string(), detail("shope-1", at_noon(d), 0));

    let mut driver = make_driver(reader, SqliteStore::new_in_memory().unwrap(), &dir);
    driver.run().await.unwrap();

    let store = driver.store();
    assert_eq!(store.item_count().unwrap(), 0);

    // The order stays uncaptured so a later run retries it, but the page
    // and year still reconcile (every order was visited).
    assert!(!store.order_captured("shope-1").unwrap());
    assert!(store.page_checked(2022, 1).unwrap());
    assert!(store.year_checked(2022).unwrap());
}
