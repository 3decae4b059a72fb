//! Cache statistics
//!
//! Read-only aggregation over the captured items, used by the `--stats`
//! mode and embedded at the top of the generated report.

use crate::storage::{StateStore, StorageResult, YearTotal};
use chrono::{DateTime, Utc};

/// Aggregate statistics over the captured cache
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub items: u64,
    pub orders: u64,
    pub years: Vec<YearTotal>,
    /// Sum of price x quantity over all items, in integer currency units
    pub total_spend: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Loads statistics from the state store
pub fn load_statistics<S: StateStore>(store: &S) -> StorageResult<CacheStats> {
    let years = store.year_totals()?;
    let total_spend = years.iter().map(|y| y.spend).sum();

    Ok(CacheStats {
        items: store.item_count()?,
        orders: store.captured_order_count()?,
        years,
        total_spend,
        last_modified: store.last_modified()?,
    })
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &CacheStats) {
    println!("=== Purchase History Cache ===\n");

    match &stats.last_modified {
        Some(stamp) => println!("Last updated: {}", stamp.to_rfc3339()),
        None => println!("Last updated: never"),
    }

    println!("Captured orders: {}", stats.orders);
    println!("Captured items:  {}", stats.items);
    println!("Total spend:     {}円", stats.total_spend);

    if !stats.years.is_empty() {
        println!("\nPer year:");
        for year in &stats.years {
            println!(
                "  {}: {:>5} items in {:>5} orders, {:>12}円",
                year.year, year.items, year.orders, year.spend
            );
        }
    }
}
