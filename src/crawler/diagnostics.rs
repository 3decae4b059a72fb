//! Failure diagnostics sink
//!
//! Before an unrecoverable error propagates, the current page is dumped to
//! the debug directory so the failure can be inspected after the fact.
//! Capture failures are logged and swallowed; diagnostics must never mask
//! the error that triggered them.

use crate::reader::{PageReader, PageSnapshot};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Writes page snapshots for postmortem inspection
pub struct DiagnosticsSink {
    debug_dir: PathBuf,
}

impl DiagnosticsSink {
    pub fn new(debug_dir: impl Into<PathBuf>) -> Self {
        Self {
            debug_dir: debug_dir.into(),
        }
    }

    /// Captures the reader's current page under a tagged, timestamped name
    pub async fn capture<R: PageReader>(&self, reader: &mut R, tag: &str) {
        match reader.snapshot().await {
            Ok(snapshot) => {
                if let Err(e) = self.write(&snapshot, tag) {
                    tracing::warn!("Failed to write diagnostic snapshot: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to capture diagnostic snapshot: {}", e);
            }
        }
    }

    fn write(&self, snapshot: &PageSnapshot, tag: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.debug_dir)?;

        let name = format!("{}_{}.html", Utc::now().format("%Y%m%d-%H%M%S"), tag);
        let path = self.debug_dir.join(name);

        let mut content = format!("<!-- {} -->\n", snapshot.url);
        content.push_str(&snapshot.source);
        std::fs::write(&path, content)?;

        tracing::info!("Saved diagnostic snapshot to {}", path.display());
        Ok(())
    }

    pub fn debug_dir(&self) -> &Path {
        &self.debug_dir
    }
}
