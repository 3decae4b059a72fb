//! Orderhist: an incremental purchase-history harvester
//!
//! This crate walks a session-authenticated, year-paginated order-history
//! resource and accumulates every purchased item into a durable SQLite cache.
//! The crawl is resumable: progress is checkpointed after every listing page,
//! and repeated runs only touch the years, pages and orders that may still
//! have changed.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod reader;
pub mod session;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for orderhist operations
#[derive(Debug, Error)]
pub enum HistError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Navigation error: {0}")]
    Nav(#[from] reader::NavError),

    #[error("Session error: {0}")]
    Session(#[from] session::SessionError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for orderhist operations
pub type Result<T> = std::result::Result<T, HistError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::Driver;
pub use model::{Item, OrderInfo, OrderKind};
pub use reader::PageReader;
pub use state::PageState;
pub use storage::{SqliteStore, StateStore};
