//! In-process watch service driven by explicit event injection.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::events::{EventKind, PendingEvent, Sensitivity};
use super::service::{WatchHandle, WatchService};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    watched: HashMap<PathBuf, WatchHandle>,
    directories: HashMap<WatchHandle, PathBuf>,
    queued: HashMap<WatchHandle, Vec<PendingEvent>>,
    ready: VecDeque<WatchHandle>,
    failures: HashMap<PathBuf, io::ErrorKind>,
    registrations: Vec<PathBuf>,
    cancelled: usize,
    closed: bool,
}

impl MemoryState {
    fn enqueue(&mut self, handle: WatchHandle, event: PendingEvent) {
        let queue = self.queued.entry(handle).or_default();
        if queue.is_empty() {
            self.ready.push_back(handle);
        }
        queue.push(event);
    }
}

/// Watch service whose events come from [`inject`](Self::inject).
///
/// Clones share state, so a test can keep one clone while the watching file
/// system owns another. It never touches the disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryWatchService {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryWatchService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `event` on the watch for `directory`.
    ///
    /// Returns `false` if `directory` is not being watched.
    pub fn inject(&self, directory: impl AsRef<Path>, event: PendingEvent) -> bool {
        let mut state = self.state.lock();
        let Some(&handle) = state.watched.get(directory.as_ref()) else {
            return false;
        };
        state.enqueue(handle, event);
        true
    }

    /// Queue `event` on `handle` whether or not it is registered.
    pub fn inject_for_handle(&self, handle: WatchHandle, event: PendingEvent) {
        self.state.lock().enqueue(handle, event);
    }

    /// Make the next registration of `directory` fail with `kind`.
    pub fn fail_registration(&self, directory: impl AsRef<Path>, kind: io::ErrorKind) {
        self.state
            .lock()
            .failures
            .insert(directory.as_ref().to_path_buf(), kind);
    }

    #[must_use]
    pub fn is_watching(&self, directory: impl AsRef<Path>) -> bool {
        self.state.lock().watched.contains_key(directory.as_ref())
    }

    #[must_use]
    pub fn watched_directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<_> = self.state.lock().watched.keys().cloned().collect();
        dirs.sort();
        dirs
    }

    /// Every directory ever registered, in order.
    #[must_use]
    pub fn registrations(&self) -> Vec<PathBuf> {
        self.state.lock().registrations.clone()
    }

    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        self.state.lock().cancelled
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl WatchService for MemoryWatchService {
    fn register(
        &mut self,
        directory: &Path,
        _kinds: &[EventKind],
        _sensitivity: Sensitivity,
    ) -> io::Result<WatchHandle> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(io::Error::other("watch service is closed"));
        }
        if let Some(kind) = state.failures.remove(directory) {
            return Err(io::Error::new(kind, "injected registration failure"));
        }
        if let Some(&handle) = state.watched.get(directory) {
            return Ok(handle);
        }

        state.next_id += 1;
        let handle = WatchHandle::new(state.next_id);
        state.watched.insert(directory.to_path_buf(), handle);
        state.directories.insert(handle, directory.to_path_buf());
        state.registrations.push(directory.to_path_buf());
        Ok(handle)
    }

    fn poll(&mut self) -> Option<WatchHandle> {
        self.state.lock().ready.pop_front()
    }

    fn pending_events(&mut self, handle: WatchHandle) -> Vec<PendingEvent> {
        let mut state = self.state.lock();
        state.ready.retain(|ready| *ready != handle);
        state.queued.remove(&handle).unwrap_or_default()
    }

    fn cancel(&mut self, handle: WatchHandle) {
        let mut state = self.state.lock();
        if let Some(dir) = state.directories.remove(&handle) {
            state.watched.remove(&dir);
            state.cancelled += 1;
        }
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.watched.clear();
        state.directories.clear();
        state.queued.clear();
        state.ready.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(service: &mut MemoryWatchService, dir: &str) -> WatchHandle {
        service
            .register(Path::new(dir), &[EventKind::Created], Sensitivity::High)
            .unwrap()
    }

    #[test]
    fn test_inject_and_poll() {
        let mut service = MemoryWatchService::new();
        let handle = register(&mut service, "/proj");

        assert!(service.inject("/proj", PendingEvent::new(EventKind::Created, "a")));
        assert!(service.inject("/proj", PendingEvent::new(EventKind::Deleted, "b")));

        assert_eq!(service.poll(), Some(handle));
        assert_eq!(service.poll(), None);
        assert_eq!(service.pending_events(handle).len(), 2);
        assert!(service.pending_events(handle).is_empty());
    }

    #[test]
    fn test_inject_unwatched_directory() {
        let service = MemoryWatchService::new();
        assert!(!service.inject("/nowhere", PendingEvent::Overflow));
    }

    #[test]
    fn test_events_survive_cancel() {
        let mut service = MemoryWatchService::new();
        let handle = register(&mut service, "/proj");
        service.inject("/proj", PendingEvent::new(EventKind::Modified, "a"));

        assert_eq!(service.poll(), Some(handle));
        service.cancel(handle);
        assert!(!service.is_watching("/proj"));
        assert_eq!(service.pending_events(handle).len(), 1);
        assert_eq!(service.cancelled_count(), 1);

        // Cancelling twice is harmless.
        service.cancel(handle);
        assert_eq!(service.cancelled_count(), 1);
    }

    #[test]
    fn test_injected_failure_applies_once() {
        let mut service = MemoryWatchService::new();
        service.fail_registration("/locked", io::ErrorKind::PermissionDenied);

        let err = service
            .register(Path::new("/locked"), &[], Sensitivity::High)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(service
            .register(Path::new("/locked"), &[], Sensitivity::High)
            .is_ok());
    }

    #[test]
    fn test_close_rejects_new_registrations() {
        let mut service = MemoryWatchService::new();
        register(&mut service, "/proj");
        service.close().unwrap();
        assert!(service.is_closed());
        assert!(service.watched_directories().is_empty());
        assert!(service
            .register(Path::new("/proj"), &[], Sensitivity::High)
            .is_err());
    }
}
