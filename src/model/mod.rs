//! Domain records for orders and purchased items
//!
//! These are the typed outputs the crawl core consumes from the page reader
//! and the records it persists into the crawl state store.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::fmt;
use url::Url;

/// Number of orders the resource returns per listing page
pub const ORDERS_PER_PAGE: u32 = 20;

/// Kind tag attached to an order row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderKind {
    /// Ordinary store purchase
    Normal,
    /// Hometown tax donation handled through the store
    TaxDonation,
}

impl OrderKind {
    /// Converts the kind to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::TaxDonation => "tax",
        }
    }

    /// Parses a kind from its database string representation
    ///
    /// Returns None if the string doesn't match any known kind.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "tax" => Some(Self::TaxDonation),
            _ => None,
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// One order row as enumerated on a listing page
#[derive(Debug, Clone, PartialEq)]
pub struct OrderInfo {
    /// Order number, globally unique, `<seller>-<sequence>`
    pub order_no: String,
    /// Seller (store) display name
    pub seller: String,
    /// Order date as shown on the listing
    pub date: NaiveDate,
    pub kind: OrderKind,
    /// Site-internal action handle that opens the order's detail view
    pub action: String,
}

/// One raw line item as enumerated on an order detail view
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub name: String,
    /// Unit price in integer currency units
    pub price: i64,
    pub quantity: u32,
    /// Product page URL; the canonical item id is derived from it
    pub url: String,
    /// Thumbnail image URL
    pub thumb_url: String,
}

/// Parsed order detail view: the exact timestamp plus its line items
#[derive(Debug, Clone)]
pub struct OrderDetail {
    pub ordered_at: NaiveDateTime,
    pub lines: Vec<LineItem>,
}

/// A fully captured line item with order-level fields merged in
///
/// Items are keyed by (order_no, item_id); recording the same key twice
/// replaces rather than duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Canonical item id, `<store_id>_<item_id>`
    pub item_id: String,
    pub name: String,
    /// Unit price in integer currency units
    pub price: i64,
    pub quantity: u32,
    pub url: String,
    /// Category breadcrumb with synthetic root/leaf entries stripped
    pub category: Vec<String>,
    /// Path of the saved thumbnail image, if one was captured
    pub thumbnail: Option<String>,
    pub order_no: String,
    pub seller: String,
    pub kind: OrderKind,
    pub ordered_at: NaiveDateTime,
}

impl Item {
    /// Calendar year this item is filed under
    pub fn year(&self) -> i32 {
        self.ordered_at.date().year()
    }
}

/// Derives the canonical item id from a product page URL.
///
/// Product URLs have the shape `https://<host>/<store_id>/<page>.html`; the
/// id is `<store_id>_<page>`. Returns None when the URL does not follow
/// that shape.
pub fn item_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    let store_id = segments.next()?;
    let page = segments.next()?;
    let item = page.strip_suffix(".html").unwrap_or(page);
    if store_id.is_empty() || item.is_empty() {
        return None;
    }
    Some(format!("{}_{}", store_id, item))
}

/// Recovers the seller's store id from an order number (`<seller>-<sequence>`)
pub fn seller_from_order_no(order_no: &str) -> Option<&str> {
    let (store_id, sequence) = order_no.rsplit_once('-')?;
    if store_id.is_empty() || sequence.is_empty() {
        return None;
    }
    if !sequence.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(store_id)
}

/// Strips the synthetic root and leaf entries from a category breadcrumb.
///
/// The breadcrumb's first entry is the site root and its last entry repeats
/// the item name; both are dropped when the trail is at least two deep.
pub fn trim_breadcrumb(mut crumbs: Vec<String>) -> Vec<String> {
    if crumbs.len() >= 2 {
        crumbs.remove(0);
        crumbs.pop();
    }
    crumbs
}
