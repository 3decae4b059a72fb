//! Crawler module: the incremental harvest driver and its support pieces
//!
//! This module contains the crawl control logic, including:
//! - The year -> page -> order planner/driver state machine
//! - Named progress counters
//! - Diagnostic page snapshots on failure

mod diagnostics;
mod driver;
mod progress;

pub use diagnostics::DiagnosticsSink;
pub use driver::{total_pages, Driver};
pub use progress::{Counter, Progress};

use crate::config::Config;
use crate::reader::WebDriverReader;
use crate::session::{SessionProvider, StdinPrompt};
use crate::storage::open_store;
use crate::Result;
use std::path::Path;

/// Runs a complete harvest against the live resource
///
/// Wires the WebDriver reader, the SQLite state store and the interactive
/// session provider together and drives the crawl to completion. The
/// browser session is closed on success; on failure it is left to the
/// WebDriver endpoint so the dumped page can still be inspected manually.
pub async fn harvest(config: &Config, capture_thumbnails: bool) -> Result<()> {
    let store = open_store(Path::new(&config.output.database_path))?;

    let reader =
        WebDriverReader::connect(&config.site.webdriver_url, &config.site.history_url).await?;

    let session = SessionProvider::new(&config.login.user, &config.login.mail, StdinPrompt);
    let diagnostics = DiagnosticsSink::new(&config.output.debug_dir);

    let mut driver = Driver::new(
        reader,
        store,
        session,
        diagnostics,
        &config.output.thumbnail_dir,
        capture_thumbnails,
    );

    driver.run().await?;

    let (reader, _store) = driver.into_parts();
    reader.close().await?;

    Ok(())
}
