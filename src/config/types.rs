use serde::Deserialize;

/// Main configuration structure for orderhist
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub login: LoginConfig,
    pub site: SiteConfig,
    pub output: OutputConfig,
}

/// Login identifiers used by the session provider
#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    /// Account identifier typed into the login form
    pub user: String,

    /// Registered mail address, answered during the identity-confirmation
    /// challenge
    pub mail: String,
}

/// Live resource endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// WebDriver endpoint controlling the browser session
    #[serde(rename = "webdriver-url")]
    pub webdriver_url: String,

    /// Base URL of the year-paginated order-history listing
    #[serde(rename = "history-url")]
    pub history_url: String,
}

/// Output and working-directory configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite cache file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path of the generated markdown report
    #[serde(rename = "report-path")]
    pub report_path: String,

    /// Directory for captured thumbnail images
    #[serde(rename = "thumbnail-dir")]
    pub thumbnail_dir: String,

    /// Directory for diagnostic page snapshots
    #[serde(rename = "debug-dir")]
    pub debug_dir: String,
}
