//! Turns the store's known directories into watch registrations.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::Arc;

use tracing::Dispatch;

use super::events::{Sensitivity, ALL_EVENT_KINDS};
use super::service::{WatchHandle, WatchService};
use super::stats::{RegistrationOutcome, WatchStats};
use crate::error::WatcherError;
use crate::snapshot::{PathKey, SnapshotStore};
use crate::Result;

/// Directory to handle mapping for the current watch cycle.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    by_directory: HashMap<PathKey, WatchHandle>,
    by_handle: HashMap<WatchHandle, PathKey>,
}

impl WatchRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, directory: PathKey, handle: WatchHandle) {
        self.by_handle.insert(handle, directory.clone());
        self.by_directory.insert(directory, handle);
    }

    /// Forget `handle`, returning the directory it watched.
    pub fn remove(&mut self, handle: WatchHandle) -> Option<PathKey> {
        let directory = self.by_handle.remove(&handle)?;
        self.by_directory.remove(&directory);
        Some(directory)
    }

    #[must_use]
    pub fn contains(&self, directory: &PathKey) -> bool {
        self.by_directory.contains_key(directory)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    /// Remove and return every entry.
    pub fn drain(&mut self) -> Vec<(WatchHandle, PathKey)> {
        self.by_directory.clear();
        self.by_handle.drain().collect()
    }
}

/// Registers one watch per known directory.
#[derive(Debug, Clone)]
pub struct WatchRegistrar {
    dispatch: Dispatch,
    stats: Arc<WatchStats>,
}

impl WatchRegistrar {
    #[must_use]
    pub const fn new(dispatch: Dispatch, stats: Arc<WatchStats>) -> Self {
        Self { dispatch, stats }
    }

    /// Watch every directory `store` currently knows about.
    ///
    /// Directories that are gone from disk are skipped silently. Any other
    /// failure stops registration and is returned; handles registered before
    /// it stay in `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::RegistrationFailed`] when a directory cannot
    /// be inspected or watched for a reason other than being absent.
    pub fn register<W: WatchService + ?Sized>(
        &self,
        store: &SnapshotStore,
        service: &mut W,
        registry: &mut WatchRegistry,
    ) -> Result<RegistrationOutcome> {
        tracing::dispatcher::with_default(&self.dispatch, || {
            let result = self.register_all(store, service, registry);
            if result.is_err() {
                self.stats
                    .registration_failures
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            result
        })
    }

    fn register_all<W: WatchService + ?Sized>(
        &self,
        store: &SnapshotStore,
        service: &mut W,
        registry: &mut WatchRegistry,
    ) -> Result<RegistrationOutcome> {
        let mut outcome = RegistrationOutcome::default();

        for directory in store.known_directories() {
            if registry.contains(&directory) {
                continue;
            }
            let path = directory.to_path_buf();

            match fs::metadata(&path) {
                Ok(metadata) if metadata.is_dir() => {}
                Ok(_) => {
                    tracing::debug!(path = %path.display(), "Known directory is no longer a directory, skipping");
                    outcome.skipped_stale += 1;
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "Known directory no longer exists, skipping");
                    outcome.skipped_stale += 1;
                    continue;
                }
                Err(source) => return Err(registration_failed(&directory, source)),
            }

            match service.register(&path, &ALL_EVENT_KINDS, Sensitivity::High) {
                Ok(handle) => {
                    tracing::debug!(path = %path.display(), %handle, "Start watching");
                    registry.insert(directory, handle);
                    outcome.registered += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "Directory vanished before it could be watched");
                    outcome.skipped_stale += 1;
                }
                Err(source) => {
                    tracing::error!(path = %path.display(), error = %source, "Failed to watch directory");
                    return Err(registration_failed(&directory, source));
                }
            }
        }

        WatchStats::add(&self.stats.directories_registered, outcome.registered);
        WatchStats::add(&self.stats.stale_directories_skipped, outcome.skipped_stale);
        Ok(outcome)
    }
}

fn registration_failed(directory: &PathKey, source: io::Error) -> crate::Error {
    WatcherError::RegistrationFailed {
        path: directory.to_string(),
        source,
    }
    .into()
}
