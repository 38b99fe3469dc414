//! Watch cycle statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Counters accumulated across watch cycles.
#[derive(Debug, Default)]
pub struct WatchStats {
    pub cycles: AtomicU64,
    pub directories_registered: AtomicU64,
    pub stale_directories_skipped: AtomicU64,
    pub handles_drained: AtomicU64,
    pub paths_invalidated: AtomicU64,
    pub overflows: AtomicU64,
    pub unknown_handles: AtomicU64,
    pub registration_failures: AtomicU64,
}

impl WatchStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatchStatsSnapshot {
        WatchStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            directories_registered: self.directories_registered.load(Ordering::Relaxed),
            stale_directories_skipped: self.stale_directories_skipped.load(Ordering::Relaxed),
            handles_drained: self.handles_drained.load(Ordering::Relaxed),
            paths_invalidated: self.paths_invalidated.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            unknown_handles: self.unknown_handles.load(Ordering::Relaxed),
            registration_failures: self.registration_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Snapshot of watch stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatchStatsSnapshot {
    pub cycles: u64,
    pub directories_registered: u64,
    pub stale_directories_skipped: u64,
    pub handles_drained: u64,
    pub paths_invalidated: u64,
    pub overflows: u64,
    pub unknown_handles: u64,
    pub registration_failures: u64,
}

/// What one `start_watching` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationOutcome {
    pub registered: usize,
    pub skipped_stale: usize,
}

/// What one `stop_watching` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainOutcome {
    /// Ready handles whose events were applied.
    pub handles_drained: usize,
    /// Change events turned into invalidations.
    pub paths_invalidated: usize,
    /// Ready handles that no registration claimed.
    pub unknown_handles: usize,
    /// An overflow was seen and the drain stopped early.
    pub overflowed: bool,
    /// The whole store was dropped, by overflow or after a failed registration.
    pub invalidated_all: bool,
}
