//! OS watch service backed by notify-rs.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender};
use notify::event::{EventKind as NotifyKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use super::events::{EventKind, PendingEvent, Sensitivity};
use super::service::{WatchHandle, WatchService};
use crate::error::WatcherError;
use crate::snapshot::{CaseSensitivity, PathKey};
use crate::Result;

type RawEvent = notify::Result<notify::Event>;

/// Watch service using the platform's recommended notify backend.
///
/// Each registration is a non-recursive watch on one directory. The notify
/// callback only forwards raw events over a channel; routing them to handles
/// happens on the caller's thread in [`poll`](WatchService::poll).
///
/// Backends may report a directory by its resolved path (`/private/var` for
/// `/var` under FSEvents) or in a different case than it was registered
/// with, so every registration is reachable under both the given and the
/// canonical spelling, compared with the store's case sensitivity.
pub struct NotifyWatchService {
    watcher: Option<RecommendedWatcher>,
    events_rx: Receiver<RawEvent>,
    case_sensitivity: CaseSensitivity,
    next_id: u64,
    handles: HashMap<PathKey, WatchHandle>,
    directories: HashMap<WatchHandle, Registration>,
    queued: HashMap<WatchHandle, Vec<PendingEvent>>,
    ready: VecDeque<WatchHandle>,
}

#[derive(Debug)]
struct Registration {
    /// The path handed to notify, needed again to unwatch.
    path: PathBuf,
    keys: Vec<PathKey>,
}

impl NotifyWatchService {
    /// Open the OS notification facility.
    ///
    /// Event paths are matched to registrations under `case_sensitivity`,
    /// which should be the mode of the store being watched.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be created.
    pub fn new(case_sensitivity: CaseSensitivity) -> Result<Self> {
        let (events_tx, events_rx): (Sender<RawEvent>, _) = crossbeam_channel::unbounded();
        let watcher = notify::recommended_watcher(move |event: RawEvent| {
            let _ = events_tx.send(event);
        })
        .map_err(|e| WatcherError::ServiceInit {
            reason: e.to_string(),
        })?;

        Ok(Self {
            watcher: Some(watcher),
            events_rx,
            case_sensitivity,
            next_id: 0,
            handles: HashMap::new(),
            directories: HashMap::new(),
            queued: HashMap::new(),
            ready: VecDeque::new(),
        })
    }

    /// Move everything notify has delivered so far into per-handle queues.
    fn collect(&mut self) {
        while let Ok(raw) = self.events_rx.try_recv() {
            match raw {
                Ok(event) => self.route(&event),
                Err(e) => {
                    tracing::warn!(error = %e, "Watch backend reported an error, treating as overflow");
                    self.overflow_all();
                }
            }
        }
    }

    fn route(&mut self, event: &notify::Event) {
        if event.need_rescan() {
            self.overflow_all();
            return;
        }
        let Some(kind) = classify(&event.kind) else {
            return;
        };
        for path in &event.paths {
            match self.owner(path) {
                Some((handle, name)) => self.enqueue(handle, PendingEvent::new(kind, name)),
                None => {
                    tracing::debug!(path = %path.display(), "Event matches no watched directory");
                }
            }
        }
    }

    /// The registration an event path belongs to, and its name relative to it.
    fn owner(&self, path: &Path) -> Option<(WatchHandle, PathBuf)> {
        let key = PathKey::from_path(path, self.case_sensitivity).ok()?;
        if let (Some(parent), Some(name)) = (key.parent(), key.file_name()) {
            if let Some(&handle) = self.handles.get(&parent) {
                return Some((handle, PathBuf::from(name)));
            }
        }
        self.handles
            .get(&key)
            .map(|&handle| (handle, PathBuf::new()))
    }

    /// Keys a directory may show up under in events: as given and resolved.
    fn keys_for(&self, directory: &Path) -> io::Result<Vec<PathKey>> {
        let given = PathKey::from_path(directory, self.case_sensitivity)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let mut keys = vec![given];
        if let Ok(canonical) = fs::canonicalize(directory) {
            if let Ok(resolved) = PathKey::from_path(&canonical, self.case_sensitivity) {
                if !keys.contains(&resolved) {
                    keys.push(resolved);
                }
            }
        }
        Ok(keys)
    }

    fn overflow_all(&mut self) {
        let handles: Vec<_> = self.directories.keys().copied().collect();
        for handle in handles {
            self.enqueue(handle, PendingEvent::Overflow);
        }
    }

    fn enqueue(&mut self, handle: WatchHandle, event: PendingEvent) {
        let queue = self.queued.entry(handle).or_default();
        if queue.is_empty() {
            self.ready.push_back(handle);
        }
        queue.push(event);
    }
}

impl std::fmt::Debug for NotifyWatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatchService")
            .field("open", &self.watcher.is_some())
            .field("watched", &self.handles.len())
            .field("ready", &self.ready.len())
            .finish_non_exhaustive()
    }
}

impl WatchService for NotifyWatchService {
    fn register(
        &mut self,
        directory: &Path,
        _kinds: &[EventKind],
        _sensitivity: Sensitivity,
    ) -> io::Result<WatchHandle> {
        // notify always reports every event class as fast as the backend can.
        let keys = self.keys_for(directory)?;
        if let Some(&handle) = keys.iter().find_map(|key| self.handles.get(key)) {
            return Ok(handle);
        }
        let Some(watcher) = self.watcher.as_mut() else {
            return Err(io::Error::other("watch service is closed"));
        };
        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(into_io_error)?;

        self.next_id += 1;
        let handle = WatchHandle::new(self.next_id);
        for key in &keys {
            self.handles.insert(key.clone(), handle);
        }
        self.directories.insert(
            handle,
            Registration {
                path: directory.to_path_buf(),
                keys,
            },
        );
        Ok(handle)
    }

    fn poll(&mut self) -> Option<WatchHandle> {
        self.collect();
        self.ready.pop_front()
    }

    fn pending_events(&mut self, handle: WatchHandle) -> Vec<PendingEvent> {
        self.ready.retain(|ready| *ready != handle);
        self.queued.remove(&handle).unwrap_or_default()
    }

    fn cancel(&mut self, handle: WatchHandle) {
        let Some(registration) = self.directories.remove(&handle) else {
            return;
        };
        for key in &registration.keys {
            self.handles.remove(key);
        }
        if let Some(watcher) = self.watcher.as_mut() {
            // The directory may already be gone, taking its watch with it.
            if let Err(e) = watcher.unwatch(&registration.path) {
                tracing::debug!(path = %registration.path.display(), error = %e, "Unwatch failed");
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.watcher.take();
        self.handles.clear();
        self.directories.clear();
        self.queued.clear();
        self.ready.clear();
        Ok(())
    }
}

fn classify(kind: &NotifyKind) -> Option<EventKind> {
    match kind {
        NotifyKind::Access(_) => None,
        NotifyKind::Create(_) | NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            Some(EventKind::Created)
        }
        NotifyKind::Remove(_) | NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            Some(EventKind::Deleted)
        }
        NotifyKind::Modify(_) | NotifyKind::Any | NotifyKind::Other => Some(EventKind::Modified),
    }
}

fn into_io_error(err: notify::Error) -> io::Error {
    match err.kind {
        notify::ErrorKind::Io(e) => e,
        notify::ErrorKind::PathNotFound => io::Error::new(io::ErrorKind::NotFound, "path not found"),
        notify::ErrorKind::MaxFilesWatch => io::Error::other("OS limit on watches reached"),
        other => io::Error::other(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, Flag, RemoveKind};
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn register(service: &mut NotifyWatchService, dir: &Path) -> WatchHandle {
        service.register(dir, &[], Sensitivity::High).unwrap()
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&NotifyKind::Create(CreateKind::File)),
            Some(EventKind::Created)
        );
        assert_eq!(
            classify(&NotifyKind::Remove(RemoveKind::Folder)),
            Some(EventKind::Deleted)
        );
        assert_eq!(
            classify(&NotifyKind::Modify(ModifyKind::Name(RenameMode::From))),
            Some(EventKind::Deleted)
        );
        assert_eq!(
            classify(&NotifyKind::Modify(ModifyKind::Any)),
            Some(EventKind::Modified)
        );
        assert_eq!(
            classify(&NotifyKind::Access(notify::event::AccessKind::Any)),
            None
        );
    }

    #[test]
    fn test_route_to_parent_watch() {
        let tmp = TempDir::new().unwrap();
        let mut service = NotifyWatchService::new(CaseSensitivity::CaseSensitive).unwrap();
        let handle = register(&mut service, tmp.path());

        let event = notify::Event::new(NotifyKind::Create(CreateKind::File))
            .add_path(tmp.path().join("new.txt"));
        service.route(&event);

        assert_eq!(service.ready.pop_front(), Some(handle));
        assert_eq!(
            service.pending_events(handle),
            vec![PendingEvent::new(EventKind::Created, "new.txt")]
        );
    }

    #[test]
    fn test_event_on_watched_directory_itself() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("child");
        fs::create_dir(&dir).unwrap();
        let mut service = NotifyWatchService::new(CaseSensitivity::CaseSensitive).unwrap();
        let handle = register(&mut service, &dir);

        let event = notify::Event::new(NotifyKind::Remove(RemoveKind::Folder)).add_path(dir.clone());
        service.route(&event);

        assert_eq!(
            service.pending_events(handle),
            vec![PendingEvent::new(EventKind::Deleted, "")]
        );
    }

    #[test]
    fn test_rescan_overflows_every_handle() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();
        let mut service = NotifyWatchService::new(CaseSensitivity::CaseSensitive).unwrap();
        let ha = register(&mut service, &a);
        let hb = register(&mut service, &b);

        service.route(&notify::Event::new(NotifyKind::Other).set_flag(Flag::Rescan));

        assert_eq!(service.pending_events(ha), vec![PendingEvent::Overflow]);
        assert_eq!(service.pending_events(hb), vec![PendingEvent::Overflow]);
    }

    #[test]
    fn test_unrelated_paths_are_dropped() {
        let tmp = TempDir::new().unwrap();
        let mut service = NotifyWatchService::new(CaseSensitivity::CaseSensitive).unwrap();
        register(&mut service, tmp.path());

        let event = notify::Event::new(NotifyKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/somewhere/else/file.txt"));
        service.route(&event);
        assert!(service.ready.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_event_under_resolved_path_reaches_handle() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real");
        fs::create_dir(&real).unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let mut service = NotifyWatchService::new(CaseSensitivity::CaseSensitive).unwrap();
        let handle = register(&mut service, &link);

        // The backend names the file by where it really lives.
        let resolved = fs::canonicalize(&real).unwrap().join("a.txt");
        service.route(&notify::Event::new(NotifyKind::Create(CreateKind::File)).add_path(resolved));

        assert_eq!(
            service.pending_events(handle),
            vec![PendingEvent::new(EventKind::Created, "a.txt")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_resolved_and_given_spelling_share_a_handle() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real");
        fs::create_dir(&real).unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let mut service = NotifyWatchService::new(CaseSensitivity::CaseSensitive).unwrap();
        let via_link = register(&mut service, &link);
        let via_real = register(&mut service, &fs::canonicalize(&real).unwrap());
        assert_eq!(via_link, via_real);

        service.cancel(via_link);
        assert!(service.handles.is_empty());
    }

    #[test]
    fn test_case_insensitive_routing() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("Proj");
        fs::create_dir(&dir).unwrap();
        let mut service = NotifyWatchService::new(CaseSensitivity::CaseInsensitive).unwrap();
        let handle = register(&mut service, &dir);

        let event = notify::Event::new(NotifyKind::Modify(ModifyKind::Any))
            .add_path(tmp.path().join("PROJ").join("Notes.TXT"));
        service.route(&event);

        assert_eq!(
            service.pending_events(handle),
            vec![PendingEvent::new(EventKind::Modified, "Notes.TXT")]
        );
    }

    #[test]
    fn test_case_sensitive_routing_keeps_spellings_apart() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("Proj");
        fs::create_dir(&dir).unwrap();
        let mut service = NotifyWatchService::new(CaseSensitivity::CaseSensitive).unwrap();
        register(&mut service, &dir);

        let event = notify::Event::new(NotifyKind::Modify(ModifyKind::Any))
            .add_path(tmp.path().join("PROJ").join("Notes.TXT"));
        service.route(&event);
        assert!(service.ready.is_empty());
    }

    #[test]
    fn test_register_missing_directory_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let mut service = NotifyWatchService::new(CaseSensitivity::CaseSensitive).unwrap();
        let err = service
            .register(&tmp.path().join("gone"), &[], Sensitivity::High)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_real_file_creation_is_reported() {
        let tmp = TempDir::new().unwrap();
        let mut service = NotifyWatchService::new(CaseSensitivity::CaseSensitive).unwrap();
        let handle = register(&mut service, tmp.path());

        fs::write(tmp.path().join("fresh.txt"), "x").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            if let Some(ready) = service.poll() {
                assert_eq!(ready, handle);
                events.extend(service.pending_events(ready));
                if !events.is_empty() {
                    break;
                }
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        assert!(events
            .iter()
            .any(|e| e.name() == Some(Path::new("fresh.txt"))));
    }

    #[test]
    fn test_close_rejects_new_registrations() {
        let tmp = TempDir::new().unwrap();
        let mut service = NotifyWatchService::new(CaseSensitivity::CaseSensitive).unwrap();
        register(&mut service, tmp.path());
        service.close().unwrap();
        assert!(service
            .register(tmp.path(), &[], Sensitivity::High)
            .is_err());
    }
}
