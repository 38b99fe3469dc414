//! Structured logging setup.
//!
//! The library itself only emits `tracing` events; the watch cycle logs
//! through the dispatcher handed to [`WatchingFileSystem`](crate::WatchingFileSystem).
//! Binaries call [`init_tracing`] once to install a global subscriber.

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

use crate::{Config, Error, Result};

/// Tracing configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON output format
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl From<&Config> for TracingConfig {
    fn from(config: &Config) -> Self {
        Self {
            level: config.log_level.clone(),
            json: config.log_json,
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.level` when set. Without it the
/// notify backend is held to warnings, since it logs every raw event at
/// debug and would drown out the watch cycle's own lines.
///
/// # Errors
///
/// Returns [`Error::Config`] for an unparsable level and [`Error::Internal`]
/// if a global subscriber is already installed in this process.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(&config.level)?,
    };

    let (plain, json) = if config.json {
        let layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        (None, Some(layer))
    } else {
        let layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        (Some(layer), None)
    };

    Registry::default()
        .with(filter)
        .with(plain)
        .with(json)
        .try_init()
        .map_err(|e| Error::internal(format!("failed to install log subscriber: {e}")))?;

    tracing::debug!(level = %config.level, json = config.json, "Tracing initialized");
    Ok(())
}

fn default_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(format!("{level},{NOTIFY_DIRECTIVE}"))
        .map_err(|e| Error::config(format!("invalid log level '{level}': {e}")))
}

const NOTIFY_DIRECTIVE: &str = "notify=warn";
