//! The watching virtual file system handed to the build engine.
//!
//! A [`WatchingFileSystem`] owns the snapshot store and the watch service and
//! runs one watch cycle around the idle time between builds:
//!
//! ```text
//! build N ends   -> start_watching()   register every known directory
//!   ...idle, OS events pile up...
//! build N+1 starts -> stop_watching()  drain events into invalidations
//! ```
//!
//! Mutation of the store by the cycle only happens inside these two calls,
//! never while a build is reading.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::Dispatch;

use crate::error::WatcherError;
use crate::snapshot::{SnapshotNode, SnapshotStore};
use crate::watcher::{
    platform_watch_service, DrainOutcome, EventDrainer, RegistrationOutcome, WatchRegistrar,
    WatchRegistry, WatchService, WatchStats, WatchStatsSnapshot,
};
use crate::{Config, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleState {
    Idle,
    Watching,
}

/// Snapshot store kept valid across builds by OS change notification.
pub struct WatchingFileSystem<W: WatchService = Box<dyn WatchService>> {
    store: Arc<SnapshotStore>,
    service: W,
    registry: WatchRegistry,
    registrar: WatchRegistrar,
    drainer: EventDrainer,
    stats: Arc<WatchStats>,
    dispatch: Dispatch,
    state: CycleState,
    degraded: bool,
}

impl WatchingFileSystem {
    /// Build a store from `config` watched by the platform's notify backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the OS watch
    /// service cannot be opened.
    pub fn for_platform(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = SnapshotStore::from_config(config)?;
        Ok(Self::new(
            store,
            platform_watch_service(config.case_sensitivity)?,
        ))
    }
}

impl<W: WatchService> WatchingFileSystem<W> {
    /// Wrap `store` and `service`, logging to the dispatcher current now.
    #[must_use]
    pub fn new(store: SnapshotStore, service: W) -> Self {
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        Self::with_dispatch(store, service, dispatch)
    }

    /// Wrap `store` and `service`, logging watch cycle events to `dispatch`.
    #[must_use]
    pub fn with_dispatch(store: SnapshotStore, service: W, dispatch: Dispatch) -> Self {
        let stats = WatchStats::new();
        Self {
            store: Arc::new(store),
            service,
            registry: WatchRegistry::new(),
            registrar: WatchRegistrar::new(dispatch.clone(), Arc::clone(&stats)),
            drainer: EventDrainer::new(dispatch.clone(), Arc::clone(&stats)),
            stats,
            dispatch,
            state: CycleState::Idle,
            degraded: false,
        }
    }

    /// The shared store, for build workers that probe concurrently.
    #[must_use]
    pub const fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Register a watch for every directory the store knows.
    ///
    /// Call once a build has finished. Known directories that have since
    /// vanished from disk are skipped.
    ///
    /// If a registration fails the error is returned, but the cycle still
    /// counts as started with whatever did register; the matching
    /// [`stop_watching`](Self::stop_watching) then drops the whole store,
    /// since changes under the unwatched directories went unseen.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::RegistrationFailed`] if a directory cannot be
    /// watched for any reason other than no longer existing.
    pub fn start_watching(&mut self) -> Result<RegistrationOutcome> {
        debug_assert_eq!(
            self.state,
            CycleState::Idle,
            "start_watching called while already watching"
        );
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        self.state = CycleState::Watching;

        let result = self
            .registrar
            .register(&self.store, &mut self.service, &mut self.registry);

        tracing::dispatcher::with_default(&self.dispatch, || match &result {
            Ok(outcome) => tracing::info!(
                registered = outcome.registered,
                skipped_stale = outcome.skipped_stale,
                "Started watching"
            ),
            Err(e) => tracing::error!(
                error = %e,
                registered = self.registry.len(),
                "Watch registration failed, cached state will be dropped at the next stop"
            ),
        });
        if result.is_err() {
            self.degraded = true;
        }
        result
    }

    /// Apply every change queued since [`start_watching`](Self::start_watching).
    ///
    /// Call before a build starts. Returns as soon as the queued events are
    /// exhausted; every watch of the cycle is cancelled on return.
    pub fn stop_watching(&mut self) -> DrainOutcome {
        debug_assert_eq!(
            self.state,
            CycleState::Watching,
            "stop_watching called without start_watching"
        );
        let mut outcome = self
            .drainer
            .drain(&self.store, &mut self.service, &mut self.registry);
        self.state = CycleState::Idle;

        let degraded = std::mem::take(&mut self.degraded);
        tracing::dispatcher::with_default(&self.dispatch, || {
            if degraded {
                tracing::warn!("Watch set was incomplete, dropping all VFS state");
            }
            tracing::info!(
                handles = outcome.handles_drained,
                invalidated = outcome.paths_invalidated,
                overflowed = outcome.overflowed,
                "Stopped watching"
            );
        });
        if degraded {
            self.store.invalidate_all();
            outcome.invalidated_all = true;
        }
        outcome
    }

    /// Release the watch service.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::CloseFailed`] with the OS error.
    pub fn close(&mut self) -> Result<()> {
        self.registry.drain();
        self.state = CycleState::Idle;
        self.service
            .close()
            .map_err(|source| WatcherError::CloseFailed { source })?;
        Ok(())
    }

    /// See [`SnapshotStore::probe`].
    ///
    /// # Errors
    ///
    /// Returns an error for invalid paths or I/O failures other than
    /// not-found.
    pub fn probe(&self, path: impl AsRef<Path>) -> Result<SnapshotNode> {
        self.store.probe(path)
    }

    #[must_use]
    pub fn cached(&self, path: impl AsRef<Path>) -> Option<SnapshotNode> {
        self.store.cached(path)
    }

    /// See [`SnapshotStore::invalidate`].
    ///
    /// # Errors
    ///
    /// Returns an error if any path is invalid; nothing is invalidated then.
    pub fn invalidate<I, P>(&self, paths: I) -> Result<usize>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.store.invalidate(paths)
    }

    pub fn invalidate_all(&self) {
        self.store.invalidate_all();
    }

    /// See [`SnapshotStore::update`].
    ///
    /// # Errors
    ///
    /// Returns an error if any path is invalid; `action` does not run then.
    pub fn update<I, P, F, R>(&self, paths: I, action: F) -> Result<R>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
        F: FnOnce() -> R,
    {
        self.store.update(paths, action)
    }

    /// See [`SnapshotStore::snapshot_tree`].
    ///
    /// # Errors
    ///
    /// Returns an error for invalid paths or I/O failures during the walk.
    pub fn snapshot_tree(&self, path: impl AsRef<Path>) -> Result<SnapshotNode> {
        self.store.snapshot_tree(path)
    }

    #[must_use]
    pub fn stats(&self) -> WatchStatsSnapshot {
        self.stats.snapshot()
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.state == CycleState::Watching
    }

    /// Directories with a live watch in the current cycle.
    #[must_use]
    pub fn watched_directory_count(&self) -> usize {
        self.registry.len()
    }
}

impl<W: WatchService> std::fmt::Debug for WatchingFileSystem<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchingFileSystem")
            .field("state", &self.state)
            .field("watched", &self.registry.len())
            .field("degraded", &self.degraded)
            .field("nodes", &self.store.node_count())
            .finish_non_exhaustive()
    }
}
