//! Error types and Result aliases for snapwatch.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.
//!
//! Only two failures are meant to reach a human: a watch registration that
//! the OS refused, and a failure to close the watch service. Everything else
//! the watch cycle encounters (overflow, stale directories, events for
//! cancelled handles) is absorbed and shows up as a cache miss.

use std::io;

use thiserror::Error;

/// Result type alias using snapwatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for snapwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Snapshot store error.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Process-level setup failed, such as installing the log subscriber.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Snapshot store errors.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The path cannot be turned into a store key.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Stat or hash failed for a reason other than the path being absent.
    #[error("failed to probe '{path}': {source}")]
    Probe {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The OS watch service could not be created.
    #[error("failed to start watch service: {reason}")]
    ServiceInit { reason: String },

    /// Registering a watch on a known directory failed.
    #[error("failed to watch path '{path}': {source}")]
    RegistrationFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Releasing the watch service failed.
    #[error("failed to close watch service: {source}")]
    CloseFailed {
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error came out of watch registration.
    #[must_use]
    pub const fn is_registration_failure(&self) -> bool {
        matches!(self, Self::Watcher(WatcherError::RegistrationFailed { .. }))
    }
}

impl SnapshotError {
    /// Create an invalid-path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests;
