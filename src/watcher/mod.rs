//! OS change notification and the watch cycle.
//!
//! This module provides:
//! - The [`WatchService`] capability, with a notify-rs backend and an
//!   in-memory one
//! - Registration of every known directory at the end of a build
//! - Draining of queued events into snapshot invalidations before the next one

mod drainer;
mod events;
mod memory;
mod notify_service;
mod registrar;
mod service;
mod stats;

pub use drainer::EventDrainer;
pub use events::{EventKind, PendingEvent, Sensitivity, ALL_EVENT_KINDS};
pub use memory::MemoryWatchService;
pub use notify_service::NotifyWatchService;
pub use registrar::{WatchRegistrar, WatchRegistry};
pub use service::{platform_watch_service, WatchHandle, WatchService};
pub use stats::{DrainOutcome, RegistrationOutcome, WatchStats, WatchStatsSnapshot};
