//! Configuration module for orderhist
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files.

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, LoginConfig, OutputConfig, SiteConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
