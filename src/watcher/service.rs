//! The OS watch capability the watch cycle is written against.

use std::fmt;
use std::io;
use std::path::Path;

use super::events::{EventKind, PendingEvent, Sensitivity};
use super::notify_service::NotifyWatchService;
use crate::snapshot::CaseSensitivity;
use crate::Result;

/// Opaque token for one directory registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(u64);

impl WatchHandle {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

/// Per-directory change notification.
///
/// Watches are not recursive: a registration reports changes to the direct
/// entries of one directory. Events accumulate in the background until they
/// are collected with [`poll`](Self::poll) and
/// [`pending_events`](Self::pending_events). Nothing here blocks.
pub trait WatchService: Send {
    /// Start watching `directory`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the OS cannot watch the path. A directory that
    /// no longer exists is reported as [`io::ErrorKind::NotFound`].
    fn register(
        &mut self,
        directory: &Path,
        kinds: &[EventKind],
        sensitivity: Sensitivity,
    ) -> io::Result<WatchHandle>;

    /// The next handle with queued events, or `None` if nothing is ready.
    fn poll(&mut self) -> Option<WatchHandle>;

    /// Take the events queued on `handle`. Still works after `cancel`.
    fn pending_events(&mut self, handle: WatchHandle) -> Vec<PendingEvent>;

    /// Stop watching. Unknown or already-cancelled handles are ignored.
    fn cancel(&mut self, handle: WatchHandle);

    /// Release the OS resource behind this service.
    ///
    /// # Errors
    ///
    /// Returns the error the OS reported while releasing it.
    fn close(&mut self) -> io::Result<()>;
}

impl<T: WatchService + ?Sized> WatchService for Box<T> {
    fn register(
        &mut self,
        directory: &Path,
        kinds: &[EventKind],
        sensitivity: Sensitivity,
    ) -> io::Result<WatchHandle> {
        (**self).register(directory, kinds, sensitivity)
    }

    fn poll(&mut self) -> Option<WatchHandle> {
        (**self).poll()
    }

    fn pending_events(&mut self, handle: WatchHandle) -> Vec<PendingEvent> {
        (**self).pending_events(handle)
    }

    fn cancel(&mut self, handle: WatchHandle) {
        (**self).cancel(handle);
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// The watch service for the platform this process runs on.
///
/// Event paths are matched to watched directories under `case_sensitivity`.
///
/// # Errors
///
/// Returns an error if the OS notification facility cannot be opened.
pub fn platform_watch_service(
    case_sensitivity: CaseSensitivity,
) -> Result<Box<dyn WatchService>> {
    Ok(Box::new(NotifyWatchService::new(case_sensitivity)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_identity() {
        let a = WatchHandle::new(7);
        assert_eq!(a.id(), 7);
        assert_eq!(a, WatchHandle::new(7));
        assert_eq!(a.to_string(), "watch#7");
    }

    #[test]
    fn test_boxed_service_delegates() {
        let memory = crate::watcher::MemoryWatchService::new();
        let mut boxed: Box<dyn WatchService> = Box::new(memory.clone());
        let tmp = tempfile::TempDir::new().unwrap();

        let handle = boxed
            .register(tmp.path(), &[EventKind::Created], Sensitivity::High)
            .unwrap();
        assert!(memory.inject(tmp.path(), PendingEvent::new(EventKind::Created, "a")));
        assert_eq!(boxed.poll(), Some(handle));
        assert_eq!(boxed.pending_events(handle).len(), 1);
        boxed.cancel(handle);
        boxed.close().unwrap();
        assert!(memory.is_closed());
    }
}
