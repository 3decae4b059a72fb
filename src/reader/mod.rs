//! Page reader boundary
//!
//! The crawl core drives the live resource exclusively through the
//! [`PageReader`] trait. Everything site-specific (selectors, URL shapes,
//! window juggling) lives behind it; the core only consumes its typed
//! outputs and its typed failure signal, [`NavError`].

mod webdriver;

pub use webdriver::WebDriverReader;

use crate::model::{OrderDetail, OrderInfo};
use thiserror::Error;

/// Navigation failure raised by a page reader
#[derive(Debug, Error)]
pub enum NavError {
    /// A wait for a readiness marker ran out of time
    #[error("Timed out waiting for {target}")]
    Timeout { target: String },

    /// An expected element was not present on the page
    #[error("Missing element {locator} at {target}")]
    ElementMissing { target: String, locator: String },

    /// Page content did not parse into the expected records
    #[error("Parse failure at {target}: {message}")]
    Parse { target: String, message: String },

    /// The underlying session is gone (browser closed, WebDriver died)
    #[error("Navigation session failure: {message}")]
    Session { message: String },
}

impl NavError {
    /// Transient failures leave checkpointed state intact; the next run
    /// picks up from the last unchecked page.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ElementMissing { .. } | Self::Parse { .. }
        )
    }
}

/// Result type for page reader operations
pub type NavResult<T> = Result<T, NavError>;

/// Outcome of starting the login challenge flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStep {
    /// The site dispatched a one-time code and is waiting for it
    CodeSent,
    /// The site refused the attempt because of repeated recent failures
    RateLimited,
}

/// Outcome of submitting a one-time code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeOutcome {
    /// Session established
    LoggedIn,
    /// The site wants the registered mail address confirmed first
    IdentityCheck,
    /// Code rejected; this attempt failed
    Rejected,
}

/// A page snapshot for postmortem diagnostics
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: String,
    pub source: String,
}

/// Typed view of the live order-history resource
///
/// There is exactly one navigable session behind an implementation, shared
/// and never concurrently accessed; the crawl calls these methods strictly
/// sequentially. Methods that open an auxiliary view (`item_category`,
/// `thumbnail`) must fully tear it down and restore the primary view before
/// returning, on every exit path.
#[allow(async_fn_in_trait)]
pub trait PageReader {
    /// Navigates to the order-history landing page
    async fn goto_history_home(&mut self) -> NavResult<()>;

    /// Reads the list of selectable history years from the current page
    async fn read_year_list(&mut self) -> NavResult<Vec<i32>>;

    /// Navigates to one listing page of a year's order history
    async fn goto_order_page(&mut self, year: i32, page: u32) -> NavResult<()>;

    /// Reads the year's authoritative order total from the current page
    async fn read_order_count(&mut self) -> NavResult<u32>;

    /// Enumerates the order rows on the current listing page
    async fn read_order_rows(&mut self) -> NavResult<Vec<OrderInfo>>;

    /// Opens an order's detail view via its action handle and parses it
    async fn open_order(&mut self, order: &OrderInfo) -> NavResult<OrderDetail>;

    /// Returns from an order's detail view to the listing page
    async fn close_order(&mut self) -> NavResult<()>;

    /// Fetches the raw category breadcrumb of a product page
    async fn item_category(&mut self, item_url: &str) -> NavResult<Vec<String>>;

    /// Captures a thumbnail image as PNG bytes
    async fn thumbnail(&mut self, thumb_url: &str) -> NavResult<Vec<u8>>;

    /// True when the current page carries the logged-out marker
    async fn logged_out(&mut self) -> NavResult<bool>;

    /// Starts the login challenge flow with the account identifier
    async fn begin_login(&mut self, user: &str) -> NavResult<LoginStep>;

    /// Submits the externally supplied one-time code
    async fn submit_code(&mut self, code: &str) -> NavResult<CodeOutcome>;

    /// Answers the secondary identity question with the registered mail
    async fn confirm_identity(&mut self, mail: &str) -> NavResult<()>;

    /// Captures the current page for diagnostics
    async fn snapshot(&mut self) -> NavResult<PageSnapshot>;
}
