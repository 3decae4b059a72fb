//! Output module: the downstream consumers of the crawl cache
//!
//! - Markdown report of all captured items, grouped by year
//! - Cache statistics for the `--stats` mode

mod report;
mod stats;

pub use report::generate_report;
pub use stats::{load_statistics, print_statistics, CacheStats};
