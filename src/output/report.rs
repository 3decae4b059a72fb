//! Markdown report generation
//!
//! Renders the accumulated item collection into a per-year markdown report.
//! This is the downstream consumer of the crawl cache; it never touches the
//! live resource.

use crate::output::stats::{load_statistics, CacheStats};
use crate::storage::{SqliteStore, StateStore};
use crate::{HistError, Item};
use chrono::Utc;
use std::fmt::Write as _;
use std::path::Path;

/// Generates the markdown purchase-history report
pub fn generate_report(store: &SqliteStore, path: &Path) -> crate::Result<()> {
    let items = store.items()?;
    let stats = load_statistics(store)?;

    let content = render_report(&items, &stats)
        .map_err(|e| HistError::Report(format!("render failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;

    tracing::info!("Report written to {}", path.display());
    Ok(())
}

fn render_report(items: &[Item], stats: &CacheStats) -> Result<String, std::fmt::Error> {
    let mut out = String::new();

    writeln!(out, "# Purchase History")?;
    writeln!(out)?;
    writeln!(out, "Generated: {}", Utc::now().format("%Y-%m-%d %H:%M UTC"))?;
    writeln!(out)?;
    writeln!(
        out,
        "{} items across {} orders, {}円 total.",
        stats.items, stats.orders, stats.total_spend
    )?;

    let mut current_year = None;
    for item in items {
        if current_year != Some(item.year()) {
            current_year = Some(item.year());
            writeln!(out)?;
            writeln!(out, "## {}", item.year())?;
            writeln!(out)?;
            writeln!(
                out,
                "| Date | Order | Seller | Item | Price | Qty | Category | Kind |"
            )?;
            writeln!(out, "|---|---|---|---|---:|---:|---|---|")?;
        }

        writeln!(
            out,
            "| {} | {} | {} | {} | {}円 | {} | {} | {} |",
            item.ordered_at.format("%Y-%m-%d"),
            item.order_no,
            escape_cell(&item.seller),
            escape_cell(&item.name),
            item.price,
            item.quantity,
            escape_cell(&item.category.join(" > ")),
            item.kind,
        )?;
    }

    Ok(out)
}

/// Keeps item names from breaking the table layout
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
