//! Configuration settings and validation.

use crate::snapshot::{validate_pattern, CaseSensitivity, DEFAULT_EXCLUDES};
use crate::{Error, Result};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration for a watching file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How path segments are compared.
    pub case_sensitivity: CaseSensitivity,

    /// File name globs that are never stored.
    pub default_excludes: Vec<String>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            case_sensitivity: CaseSensitivity::for_current_platform(),
            default_excludes: DEFAULT_EXCLUDES.iter().map(|s| (*s).to_string()).collect(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables and defaults.
    ///
    /// Reads `SNAPWATCH_CASE_SENSITIVITY`, `SNAPWATCH_DEFAULT_EXCLUDES`
    /// (comma separated), `SNAPWATCH_LOG_LEVEL` and `SNAPWATCH_LOG_JSON`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the result is
    /// invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("SNAPWATCH_CASE_SENSITIVITY") {
            config.case_sensitivity = value.parse().map_err(Error::config)?;
        }
        if let Some(value) = lookup("SNAPWATCH_DEFAULT_EXCLUDES") {
            config.default_excludes = value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = lookup("SNAPWATCH_LOG_LEVEL") {
            config.log_level = value;
        }
        if let Some(value) = lookup("SNAPWATCH_LOG_JSON") {
            config.log_json = matches!(value.to_lowercase().as_str(), "true" | "1" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        for pattern in &self.default_excludes {
            validate_pattern(pattern)?;
        }

        Ok(())
    }
}
