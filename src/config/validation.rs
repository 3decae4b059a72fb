use crate::config::types::{Config, LoginConfig, OutputConfig, SiteConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_login_config(&config.login)?;
    validate_site_config(&config.site)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates login identifiers
fn validate_login_config(config: &LoginConfig) -> Result<(), ConfigError> {
    if config.user.is_empty() {
        return Err(ConfigError::Validation(
            "login user cannot be empty".to_string(),
        ));
    }

    validate_email(&config.mail)?;

    Ok(())
}

/// Validates resource endpoints
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    Url::parse(&config.webdriver_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid webdriver-url: {}", e)))?;

    let history = Url::parse(&config.history_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid history-url: {}", e)))?;

    if history.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "history-url '{}' must use HTTPS scheme",
            config.history_url
        )));
    }

    if history.query().is_some() {
        return Err(ConfigError::Validation(format!(
            "history-url '{}' must not carry a query string; paging parameters are appended",
            config.history_url
        )));
    }

    Ok(())
}

/// Validates output paths
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    let fields = [
        ("database-path", &config.database_path),
        ("report-path", &config.report_path),
        ("thumbnail-dir", &config.thumbnail_dir),
        ("debug-dir", &config.debug_dir),
    ];

    for (name, value) in fields {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "login mail cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
