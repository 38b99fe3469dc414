//! Applies queued watch events to the snapshot store.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::Dispatch;

use super::events::PendingEvent;
use super::registrar::WatchRegistry;
use super::service::WatchService;
use super::stats::{DrainOutcome, WatchStats};
use crate::snapshot::SnapshotStore;

/// Drains every event the watch service has queued, without waiting.
#[derive(Debug, Clone)]
pub struct EventDrainer {
    dispatch: Dispatch,
    stats: Arc<WatchStats>,
}

impl EventDrainer {
    #[must_use]
    pub const fn new(dispatch: Dispatch, stats: Arc<WatchStats>) -> Self {
        Self { dispatch, stats }
    }

    /// Empty the service's ready queue into store invalidations.
    ///
    /// Each ready handle is cancelled before its events are read. A created,
    /// modified or deleted entry invalidates exactly that path and its
    /// subtree. An overflow on any handle drops the whole store and ends the
    /// drain. Whatever is still registered afterwards is cancelled too, so
    /// `registry` is always empty on return.
    pub fn drain<W: WatchService + ?Sized>(
        &self,
        store: &SnapshotStore,
        service: &mut W,
        registry: &mut WatchRegistry,
    ) -> DrainOutcome {
        tracing::dispatcher::with_default(&self.dispatch, || {
            let outcome = Self::drain_ready(store, service, registry);
            Self::cancel_remaining(service, registry);
            self.record(&outcome);
            outcome
        })
    }

    fn drain_ready<W: WatchService + ?Sized>(
        store: &SnapshotStore,
        service: &mut W,
        registry: &mut WatchRegistry,
    ) -> DrainOutcome {
        let mut outcome = DrainOutcome::default();

        while let Some(handle) = service.poll() {
            service.cancel(handle);
            let events = service.pending_events(handle);
            let Some(directory) = registry.remove(handle) else {
                tracing::debug!(%handle, events = events.len(), "Ignoring events for unregistered watch");
                outcome.unknown_handles += 1;
                continue;
            };
            tracing::debug!(path = %directory, "Stop watching");
            outcome.handles_drained += 1;

            for event in events {
                let name = match &event {
                    PendingEvent::Overflow => {
                        tracing::warn!(
                            path = %directory,
                            "Watch overflow: too many modifications since last build, dropping all VFS state"
                        );
                        store.invalidate_all();
                        outcome.overflowed = true;
                        outcome.invalidated_all = true;
                        break;
                    }
                    PendingEvent::Created { name }
                    | PendingEvent::Modified { name }
                    | PendingEvent::Deleted { name } => name,
                };

                let changed = directory.resolve(name).unwrap_or_else(|e| {
                    tracing::debug!(path = %directory, error = %e, "Unresolvable event name, invalidating directory");
                    directory.clone()
                });
                tracing::trace!(path = %changed, kind = ?event.kind(), "Invalidating");
                store.invalidate_keys(std::slice::from_ref(&changed));
                outcome.paths_invalidated += 1;
            }

            if outcome.overflowed {
                break;
            }
        }

        outcome
    }

    fn cancel_remaining<W: WatchService + ?Sized>(service: &mut W, registry: &mut WatchRegistry) {
        for (handle, directory) in registry.drain() {
            service.cancel(handle);
            let dropped = service.pending_events(handle);
            if !dropped.is_empty() {
                tracing::debug!(path = %directory, events = dropped.len(), "Discarding events after overflow");
            }
        }
    }

    fn record(&self, outcome: &DrainOutcome) {
        WatchStats::add(&self.stats.handles_drained, outcome.handles_drained);
        WatchStats::add(&self.stats.paths_invalidated, outcome.paths_invalidated);
        WatchStats::add(&self.stats.unknown_handles, outcome.unknown_handles);
        if outcome.overflowed {
            self.stats.overflows.fetch_add(1, Ordering::Relaxed);
        }
    }
}
