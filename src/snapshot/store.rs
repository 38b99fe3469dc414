//! In-memory snapshot tree.
//!
//! The tree is persistent: every node sits behind an [`Arc`] and writers
//! rebuild only the path from the root to the node they touch, then swap the
//! root pointer. Readers clone the current root and walk it without holding
//! any lock, so a build's worker threads never see a half-applied change, and
//! dropping a subtree is a single pointer detach.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use walkdir::WalkDir;

use super::excludes::DefaultExcludes;
use super::hasher::{Blake3Hasher, FileHasher};
use super::node::{ChildEntry, DirectorySnapshot, FileSnapshot, SnapshotNode};
use super::path::{CaseSensitivity, PathKey};
use crate::config::Config;
use crate::error::SnapshotError;
use crate::Result;

/// How a grafted node combines with one already at the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Graft {
    /// Keep what is there; only add what is new.
    KeepExisting,
    /// Overwrite whatever is there.
    Replace,
}

/// Cache of observed file system state.
#[derive(Debug)]
pub struct SnapshotStore {
    root: RwLock<Arc<DirectorySnapshot>>,
    hasher: Arc<dyn FileHasher>,
    case_sensitivity: CaseSensitivity,
    excludes: DefaultExcludes,
}

impl SnapshotStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(
        hasher: Arc<dyn FileHasher>,
        case_sensitivity: CaseSensitivity,
        excludes: DefaultExcludes,
    ) -> Self {
        Self {
            root: RwLock::new(Arc::new(DirectorySnapshot::partial())),
            hasher,
            case_sensitivity,
            excludes,
        }
    }

    /// Create an empty store hashing with BLAKE3.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured exclude patterns are invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        let excludes = DefaultExcludes::new(&config.default_excludes, config.case_sensitivity)?;
        Ok(Self::new(
            Arc::new(Blake3Hasher),
            config.case_sensitivity,
            excludes,
        ))
    }

    #[must_use]
    pub const fn case_sensitivity(&self) -> CaseSensitivity {
        self.case_sensitivity
    }

    #[must_use]
    pub const fn excludes(&self) -> &DefaultExcludes {
        &self.excludes
    }

    /// Build a key for `path` under this store's case sensitivity.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is relative or not valid UTF-8.
    pub fn key_for(&self, path: impl AsRef<Path>) -> Result<PathKey> {
        Ok(PathKey::from_path(path, self.case_sensitivity)?)
    }

    /// Return the cached node for `path`, probing the file system if unknown.
    ///
    /// A path that does not exist becomes [`SnapshotNode::Missing`]. Paths
    /// below a known file or missing entry resolve to `Missing` without
    /// touching the disk. Unknown ancestors are probed on the way down and
    /// recorded too. When two threads probe the same unknown path, the first
    /// result stored wins and both callers get it.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid paths or I/O failures other than
    /// not-found.
    pub fn probe(&self, path: impl AsRef<Path>) -> Result<SnapshotNode> {
        let key = self.key_for(path)?;
        self.probe_key(&key)
    }

    /// [`Self::probe`] for an already-built key.
    ///
    /// # Errors
    ///
    /// Returns an error for I/O failures other than not-found.
    pub fn probe_key(&self, key: &PathKey) -> Result<SnapshotNode> {
        if key.is_root() {
            return Ok(SnapshotNode::Directory(self.current_root().as_ref().clone()));
        }
        if self.is_excluded(key) {
            return self.stat_node(&key.to_path_buf());
        }

        let folded = key.folded_segments();
        let root = self.current_root();
        let first_unknown = match walk(&root, &folded) {
            Walk::Found(node) => return Ok(node.clone()),
            Walk::BelowLeaf => return Ok(SnapshotNode::Missing),
            Walk::Unknown(depth) => depth,
        };
        drop(root);

        let discovered = self.discover(key, first_unknown)?;
        let reached_target = first_unknown + discovered.len() == folded.len();
        let fresh = match discovered.last() {
            Some(node) if reached_target => node.clone(),
            _ => SnapshotNode::Missing,
        };

        let subtree = chain(
            &folded[first_unknown..],
            key.segments()[first_unknown..].iter(),
            discovered,
        );
        let target = &folded[..=first_unknown];
        let name = &key.segments()[first_unknown];
        self.modify(|root| graft(root, target, name, subtree, Graft::KeepExisting));

        Ok(self.lookup(key).unwrap_or(fresh))
    }

    /// The cached node for `path`, without touching the disk.
    ///
    /// Returns `None` when the path is unknown.
    #[must_use]
    pub fn cached(&self, path: impl AsRef<Path>) -> Option<SnapshotNode> {
        let key = self.key_for(path).ok()?;
        self.lookup(&key)
    }

    /// [`Self::cached`] for an already-built key.
    #[must_use]
    pub fn lookup(&self, key: &PathKey) -> Option<SnapshotNode> {
        let root = self.current_root();
        if key.is_root() {
            return Some(SnapshotNode::Directory(root.as_ref().clone()));
        }
        match walk(&root, &key.folded_segments()) {
            Walk::Found(node) => Some(node.clone()),
            Walk::BelowLeaf => Some(SnapshotNode::Missing),
            Walk::Unknown(_) => None,
        }
    }

    /// Forget `paths` and everything below them.
    ///
    /// Unknown paths are ignored. Invalidating the root clears the store.
    /// All keys are validated before anything is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if any path is relative or not valid UTF-8.
    pub fn invalidate<I, P>(&self, paths: I) -> Result<usize>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let keys = paths
            .into_iter()
            .map(|p| self.key_for(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.invalidate_keys(&keys))
    }

    /// [`Self::invalidate`] for already-built keys. Returns how many of the
    /// keys had a node to remove.
    pub fn invalidate_keys(&self, keys: &[PathKey]) -> usize {
        if keys.iter().any(PathKey::is_root) {
            self.invalidate_all();
            return keys.len();
        }

        let folded: Vec<_> = keys.iter().map(PathKey::folded_segments).collect();
        let mut removed = 0;
        self.modify(|root| {
            let mut current: Option<DirectorySnapshot> = None;
            for segments in &folded {
                let base = current.as_ref().unwrap_or(root);
                if let Some((updated, hit)) = remove(base, segments) {
                    current = Some(updated);
                    removed += usize::from(hit);
                }
            }
            current
        });
        removed
    }

    /// Drop every node; the store becomes empty.
    pub fn invalidate_all(&self) {
        let previous = {
            let mut root = self.root.write();
            std::mem::replace(&mut *root, Arc::new(DirectorySnapshot::partial()))
        };
        drop(previous);
    }

    /// Invalidate `paths`, then run `action`.
    ///
    /// Used by callers that are about to change those paths themselves and
    /// know exactly what they touch.
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
        self.invalidate(paths)?;
        Ok(action())
    }

    /// Walk the directory at `path` and record its complete contents.
    ///
    /// Every regular file below it is hashed and excluded names are skipped.
    /// The result replaces whatever the store knew about the subtree. If
    /// `path` is not a directory, this behaves like [`Self::probe`].
    ///
    /// # Errors
    ///
    /// Returns an error for invalid paths or I/O failures other than entries
    /// vanishing during the walk.
    pub fn snapshot_tree(&self, path: impl AsRef<Path>) -> Result<SnapshotNode> {
        let key = self.key_for(path)?;
        let probed = self.probe_key(&key)?;
        if !probed.is_directory() || self.is_excluded(&key) {
            return Ok(probed);
        }

        let node = SnapshotNode::Directory(self.walk_directory(&key)?);
        if key.is_root() {
            if let SnapshotNode::Directory(dir) = &node {
                let previous = std::mem::replace(&mut *self.root.write(), Arc::new(dir.clone()));
                drop(previous);
            }
            return Ok(node);
        }

        let folded = key.folded_segments();
        let name = key.file_name().unwrap_or_default().to_string();
        self.modify(|root| graft(root, &folded, &name, Arc::new(node.clone()), Graft::Replace));
        Ok(node)
    }

    /// Every directory currently in the tree, depth first.
    ///
    /// The iterator works on the tree as it was when this was called; later
    /// changes are not seen. The root is listed first, and only when it holds
    /// a file or missing entry of its own; a root with nothing but
    /// directories below it has no direct child worth watching.
    #[must_use]
    pub fn known_directories(&self) -> KnownDirectories {
        let root = self.current_root();
        let root_key = PathKey::root(self.case_sensitivity);
        let mut iter = KnownDirectories { stack: Vec::new() };
        if root.entries().any(|e| !e.node.is_directory()) {
            iter.stack.push((root_key, root.as_ref().clone()));
        } else {
            iter.push_children(&root_key, &root);
        }
        iter
    }

    /// Number of nodes below the root.
    #[must_use]
    pub fn node_count(&self) -> usize {
        let root = self.current_root();
        root.entries().map(|e| e.node.subtree_len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current_root().is_empty()
    }

    fn current_root(&self) -> Arc<DirectorySnapshot> {
        Arc::clone(&self.root.read())
    }

    /// Apply a path-copying edit and swap the root if it produced one.
    fn modify<F>(&self, edit: F)
    where
        F: FnOnce(&DirectorySnapshot) -> Option<DirectorySnapshot>,
    {
        let previous = {
            let mut root = self.root.write();
            edit(&root).map(|updated| std::mem::replace(&mut *root, Arc::new(updated)))
        };
        // Detached subtrees are freed here, outside the lock.
        drop(previous);
    }

    fn is_excluded(&self, key: &PathKey) -> bool {
        key.segments().iter().any(|s| self.excludes.is_excluded(s))
    }

    /// Stat `key`'s prefixes from `from` downwards, stopping after the first
    /// one that is not a directory.
    fn discover(&self, key: &PathKey, from: usize) -> Result<Vec<SnapshotNode>> {
        let mut prefix = PathKey::root(self.case_sensitivity);
        for segment in &key.segments()[..from] {
            prefix = prefix.child(segment);
        }

        let mut discovered = Vec::new();
        for segment in &key.segments()[from..] {
            prefix = prefix.child(segment);
            let node = self.stat_node(&prefix.to_path_buf())?;
            let descend = node.is_directory();
            discovered.push(node);
            if !descend {
                break;
            }
        }
        Ok(discovered)
    }

    fn stat_node(&self, path: &Path) -> Result<SnapshotNode> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SnapshotNode::Missing),
            Err(e) => return Err(probe_error(path, e)),
        };

        if metadata.is_dir() {
            return Ok(SnapshotNode::Directory(DirectorySnapshot::partial()));
        }
        if !metadata.is_file() {
            tracing::debug!(path = %path.display(), "Treating special file as missing");
            return Ok(SnapshotNode::Missing);
        }

        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SnapshotNode::Missing),
            Err(e) => return Err(probe_error(path, e)),
        };
        let content_hash = self
            .hasher
            .hash(&mut file)
            .map_err(|e| probe_error(path, e))?;

        Ok(SnapshotNode::RegularFile(FileSnapshot {
            content_hash,
            size: metadata.len(),
            last_modified: metadata.modified().ok(),
        }))
    }

    fn walk_directory(&self, key: &PathKey) -> Result<DirectorySnapshot> {
        let mut walker = WalkDir::new(key.to_path_buf())
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();

        // One open frame per directory on the current descent. The walk is
        // pre-order, so an entry at depth d belongs to frames[d - 1] once the
        // deeper frames have been closed.
        let mut frames: Vec<(String, BTreeMap<String, ChildEntry>)> =
            vec![(String::new(), BTreeMap::new())];

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                    tracing::debug!(error = %e, "Entry vanished during snapshot");
                    continue;
                }
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| key.to_path_buf());
                    return Err(probe_error(&path, io::Error::from(e)));
                }
            };

            while frames.len() > entry.depth() {
                close_frame(&mut frames, self.case_sensitivity);
            }

            let is_dir = entry.file_type().is_dir();
            let Some(name) = entry.file_name().to_str() else {
                tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                if is_dir {
                    walker.skip_current_dir();
                }
                continue;
            };
            if self.excludes.is_excluded(name) {
                if is_dir {
                    walker.skip_current_dir();
                }
                continue;
            }
            if is_dir {
                frames.push((name.to_string(), BTreeMap::new()));
                continue;
            }

            let node = self.stat_node(entry.path())?;
            if let Some((_, children)) = frames.last_mut() {
                children.insert(
                    self.case_sensitivity.fold(name).into_owned(),
                    ChildEntry {
                        name: name.to_string(),
                        node: Arc::new(node),
                    },
                );
            }
        }

        while frames.len() > 1 {
            close_frame(&mut frames, self.case_sensitivity);
        }
        let (_, children) = frames.pop().unwrap_or_default();
        Ok(DirectorySnapshot::complete(children))
    }
}

/// Pop the innermost open directory and record it, complete, in its parent.
fn close_frame(
    frames: &mut Vec<(String, BTreeMap<String, ChildEntry>)>,
    case_sensitivity: CaseSensitivity,
) {
    let Some((name, children)) = frames.pop() else {
        return;
    };
    if let Some((_, parent)) = frames.last_mut() {
        let folded = case_sensitivity.fold(&name).into_owned();
        parent.insert(
            folded,
            ChildEntry {
                name,
                node: Arc::new(SnapshotNode::Directory(DirectorySnapshot::complete(children))),
            },
        );
    }
}

fn probe_error(path: &Path, source: io::Error) -> crate::Error {
    SnapshotError::Probe {
        path: path.display().to_string(),
        source,
    }
    .into()
}

enum Walk<'a> {
    Found(&'a SnapshotNode),
    /// An ancestor is a file or missing.
    BelowLeaf,
    /// Nothing is known from this depth on.
    Unknown(usize),
}

fn walk<'a>(root: &'a DirectorySnapshot, folded: &[String]) -> Walk<'a> {
    let mut dir = root;
    let Some(last) = folded.len().checked_sub(1) else {
        return Walk::Unknown(0);
    };
    for (depth, segment) in folded.iter().enumerate() {
        let Some(entry) = dir.get(segment) else {
            return Walk::Unknown(depth);
        };
        if depth == last {
            return Walk::Found(&entry.node);
        }
        match entry.node.as_ref() {
            SnapshotNode::Directory(child) => dir = child,
            _ => return Walk::BelowLeaf,
        }
    }
    Walk::Unknown(folded.len())
}

/// Nest freshly discovered nodes into one subtree rooted at the first of them.
fn chain<'a>(
    folded: &[String],
    names: impl Iterator<Item = &'a String>,
    discovered: Vec<SnapshotNode>,
) -> Arc<SnapshotNode> {
    let names: Vec<_> = names.take(discovered.len()).collect();
    let mut nodes = discovered.into_iter().rev().enumerate();
    let count = names.len();

    let Some((_, mut current)) = nodes.next() else {
        return Arc::new(SnapshotNode::Missing);
    };
    for (offset, node) in nodes {
        let child_index = count - offset;
        current = match node {
            SnapshotNode::Directory(dir) => SnapshotNode::Directory(dir.with_child(
                &folded[child_index],
                ChildEntry {
                    name: names[child_index].clone(),
                    node: Arc::new(current),
                },
            )),
            other => other,
        };
    }
    Arc::new(current)
}

/// Place `node` at `folded` below `dir`, path-copying the ancestors.
///
/// Returns `None` when nothing changed, including when an ancestor is no
/// longer a known directory.
fn graft(
    dir: &DirectorySnapshot,
    folded: &[String],
    name: &str,
    node: Arc<SnapshotNode>,
    mode: Graft,
) -> Option<DirectorySnapshot> {
    let (head, rest) = folded.split_first()?;
    if rest.is_empty() {
        let entry = match (dir.get(head), mode) {
            (None, _) | (Some(_), Graft::Replace) => ChildEntry {
                name: name.to_string(),
                node,
            },
            (Some(existing), Graft::KeepExisting) => {
                match (existing.node.as_ref(), node.as_ref()) {
                    (SnapshotNode::Directory(old), SnapshotNode::Directory(new)) => {
                        let merged = old.merged_with(new);
                        if &merged == old {
                            return None;
                        }
                        ChildEntry {
                            name: existing.name.clone(),
                            node: Arc::new(SnapshotNode::Directory(merged)),
                        }
                    }
                    _ => return None,
                }
            }
        };
        return Some(dir.with_child(head, entry));
    }

    let entry = dir.get(head)?;
    let SnapshotNode::Directory(child) = entry.node.as_ref() else {
        return None;
    };
    let updated = graft(child, rest, name, node, mode)?;
    Some(dir.with_child(
        head,
        ChildEntry {
            name: entry.name.clone(),
            node: Arc::new(SnapshotNode::Directory(updated)),
        },
    ))
}

/// Remove the node at `folded`, path-copying the ancestors.
///
/// A known parent loses its complete flag even when the child was never
/// recorded, because the change means its listing no longer matches the
/// disk. Returns the new tree and whether a node was actually removed, or
/// `None` when nothing changed.
fn remove(dir: &DirectorySnapshot, folded: &[String]) -> Option<(DirectorySnapshot, bool)> {
    let (head, rest) = folded.split_first()?;
    if rest.is_empty() {
        return match dir.get(head) {
            Some(_) => Some((dir.without_child(head), true)),
            None if dir.is_complete() => Some((dir.as_partial(), false)),
            None => None,
        };
    }
    let entry = dir.get(head)?;
    let SnapshotNode::Directory(child) = entry.node.as_ref() else {
        return None;
    };
    let (updated, removed) = remove(child, rest)?;
    Some((
        dir.with_child(
            head,
            ChildEntry {
                name: entry.name.clone(),
                node: Arc::new(SnapshotNode::Directory(updated)),
            },
        ),
        removed,
    ))
}

/// Lazy depth-first listing of known directories.
///
/// Holds its own reference to the tree it was created from.
#[derive(Debug)]
pub struct KnownDirectories {
    stack: Vec<(PathKey, DirectorySnapshot)>,
}

impl KnownDirectories {
    fn push_children(&mut self, parent: &PathKey, dir: &DirectorySnapshot) {
        let mut children: Vec<_> = dir
            .entries()
            .filter_map(|entry| match entry.node.as_ref() {
                SnapshotNode::Directory(child) => Some((parent.child(&entry.name), child.clone())),
                _ => None,
            })
            .collect();
        children.reverse();
        self.stack.extend(children);
    }
}

impl Iterator for KnownDirectories {
    type Item = PathKey;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, dir) = self.stack.pop()?;
        self.push_children(&key, &dir);
        Some(key)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct CountingHasher {
        calls: AtomicUsize,
    }

    impl FileHasher for CountingHasher {
        fn hash(&self, reader: &mut dyn io::Read) -> io::Result<crate::snapshot::HashCode> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Blake3Hasher.hash(reader)
        }
    }

    fn store_with(hasher: Arc<CountingHasher>) -> SnapshotStore {
        SnapshotStore::new(
            hasher,
            CaseSensitivity::CaseSensitive,
            DefaultExcludes::standard(CaseSensitivity::CaseSensitive).unwrap(),
        )
    }

    fn project() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let proj = tmp.path().join("proj");
        fs::create_dir_all(proj.join("src")).unwrap();
        fs::write(proj.join("src").join("A.txt"), "alpha").unwrap();
        (tmp, proj)
    }

    #[test]
    fn test_probe_missing_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = store_with(Arc::default());
        let node = store.probe(tmp.path().join("nope.txt")).unwrap();
        assert!(node.is_missing());
        assert_eq!(store.cached(tmp.path().join("nope.txt")), Some(SnapshotNode::Missing));
    }

    #[test]
    fn test_probe_file_records_hash_and_ancestors() {
        let (_tmp, proj) = project();
        let store = store_with(Arc::default());

        let node = store.probe(proj.join("src/A.txt")).unwrap();
        let file = node.as_file().unwrap();
        assert_eq!(file.size, 5);
        assert_eq!(file.content_hash.as_bytes(), blake3::hash(b"alpha").as_bytes());

        assert!(store.cached(&proj).unwrap().is_directory());
        assert!(store.cached(proj.join("src")).unwrap().is_directory());
    }

    #[test]
    fn test_probe_is_cached() {
        let (_tmp, proj) = project();
        let hasher = Arc::new(CountingHasher::default());
        let store = store_with(Arc::clone(&hasher));

        let first = store.probe(proj.join("src/A.txt")).unwrap();
        fs::write(proj.join("src/A.txt"), "changed on disk").unwrap();
        let second = store.probe(proj.join("src/A.txt")).unwrap();

        assert_eq!(first, second);
        assert_eq!(hasher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate_forces_fresh_probe() {
        let (_tmp, proj) = project();
        let hasher = Arc::new(CountingHasher::default());
        let store = store_with(Arc::clone(&hasher));
        let file = proj.join("src/A.txt");

        let before = store.probe(&file).unwrap();
        fs::write(&file, "changed on disk").unwrap();
        assert_eq!(store.invalidate([&file]).unwrap(), 1);
        assert!(store.cached(&file).is_none());

        let after = store.probe(&file).unwrap();
        assert_ne!(before, after);
        assert_eq!(hasher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalidate_removes_subtree_not_siblings() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::create_dir_all(a.join("deep")).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(b.join("f.txt"), "b").unwrap();

        let store = store_with(Arc::default());
        store.probe(a.join("deep")).unwrap();
        store.probe(b.join("f.txt")).unwrap();
        let b_before = store.cached(&b).unwrap();

        store.invalidate([&a]).unwrap();

        assert!(store.cached(&a).is_none());
        assert!(store.cached(a.join("deep")).is_none());
        assert_eq!(store.cached(&b), Some(b_before));
        assert!(store.cached(b.join("f.txt")).is_some());
    }

    #[test]
    fn test_invalidate_unknown_and_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let store = store_with(Arc::default());
        assert_eq!(store.invalidate([tmp.path().join("never-seen")]).unwrap(), 0);
        assert!(store.invalidate(["relative/path"]).is_err());
    }

    #[test]
    fn test_invalidate_root_clears_everything() {
        let (_tmp, proj) = project();
        let store = store_with(Arc::default());
        store.probe(proj.join("src/A.txt")).unwrap();
        store.invalidate(["/"]).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.known_directories().count(), 0);
    }

    #[test]
    fn test_invalidate_all_empties_known_directories() {
        let (_tmp, proj) = project();
        let store = store_with(Arc::default());
        store.probe(proj.join("src/A.txt")).unwrap();
        assert!(store.known_directories().count() > 0);

        store.invalidate_all();
        assert_eq!(store.known_directories().count(), 0);
        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn test_below_file_is_missing_without_disk_access() {
        let (_tmp, proj) = project();
        let store = store_with(Arc::default());
        store.probe(proj.join("src/A.txt")).unwrap();
        let count = store.node_count();

        let node = store.probe(proj.join("src/A.txt/child")).unwrap();
        assert!(node.is_missing());
        assert_eq!(store.node_count(), count);
    }

    #[test]
    fn test_known_directories_lists_probed_directories() {
        let (_tmp, proj) = project();
        let store = store_with(Arc::default());
        store.probe(proj.join("src/A.txt")).unwrap();

        let dirs: Vec<PathBuf> = store.known_directories().map(|k| k.to_path_buf()).collect();
        assert!(dirs.contains(&proj));
        assert!(dirs.contains(&proj.join("src")));
        assert!(!dirs.contains(&proj.join("src/A.txt")));
    }

    #[test]
    fn test_known_directories_is_a_snapshot() {
        let (_tmp, proj) = project();
        let store = store_with(Arc::default());
        store.probe(proj.join("src")).unwrap();

        let iter = store.known_directories();
        store.invalidate_all();
        assert!(iter.count() > 0);
        // Restarting sees the new state.
        assert_eq!(store.known_directories().count(), 0);
    }

    #[test]
    fn test_excluded_names_are_never_stored() {
        let (_tmp, proj) = project();
        fs::create_dir_all(proj.join(".git")).unwrap();
        let store = store_with(Arc::default());

        let node = store.probe(proj.join(".git")).unwrap();
        assert!(node.is_directory());
        assert!(store.cached(proj.join(".git")).is_none());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let (_tmp, proj) = project();
        let store = SnapshotStore::new(
            Arc::new(Blake3Hasher),
            CaseSensitivity::CaseInsensitive,
            DefaultExcludes::none(),
        );
        store.probe(proj.join("src/A.txt")).unwrap();
        assert!(store.cached(proj.join("SRC/a.TXT")).is_some());
        store.invalidate([proj.join("Src")]).unwrap();
        assert!(store.cached(proj.join("src/A.txt")).is_none());
    }

    #[test]
    fn test_update_invalidates_then_runs_action() {
        let (_tmp, proj) = project();
        let store = store_with(Arc::default());
        let file = proj.join("src/A.txt");
        store.probe(&file).unwrap();

        let written = store
            .update([&file], || fs::write(&file, "rewritten").is_ok())
            .unwrap();
        assert!(written);
        assert!(store.cached(&file).is_none());
        assert_eq!(store.probe(&file).unwrap().as_file().unwrap().size, 9);
    }

    #[test]
    fn test_snapshot_tree_records_complete_listing() {
        let (_tmp, proj) = project();
        fs::write(proj.join("top.txt"), "t").unwrap();
        fs::create_dir_all(proj.join(".git/objects")).unwrap();
        fs::create_dir_all(proj.join("empty")).unwrap();
        let store = store_with(Arc::default());

        let node = store.snapshot_tree(&proj).unwrap();
        let dir = node.as_directory().unwrap();
        assert!(dir.is_complete());
        let names: Vec<_> = dir.children().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, ["empty", "src", "top.txt"]);

        let src = store.cached(proj.join("src")).unwrap();
        assert!(src.as_directory().unwrap().is_complete());
        assert!(store.cached(proj.join("src/A.txt")).unwrap().as_file().is_some());
        assert!(store.cached(proj.join(".git")).is_none());
    }

    #[test]
    fn test_snapshot_tree_keeps_excluded_contents_out_of_siblings() {
        let (_tmp, proj) = project();
        fs::create_dir_all(proj.join(".git/refs")).unwrap();
        fs::write(proj.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(proj.join(".git/refs/main"), "0000").unwrap();
        fs::create_dir_all(proj.join("lib")).unwrap();
        fs::write(proj.join("lib/mod.txt"), "m").unwrap();
        let hasher = Arc::new(CountingHasher::default());
        let store = store_with(Arc::clone(&hasher));

        store.snapshot_tree(&proj).unwrap();

        let lib = store.cached(proj.join("lib")).unwrap();
        let names: Vec<_> = lib
            .as_directory()
            .unwrap()
            .children()
            .map(|(n, _)| n.to_string())
            .collect();
        assert_eq!(names, ["mod.txt"]);
        assert!(store.cached(proj.join("lib/HEAD")).is_none());
        assert!(store.cached(proj.join("lib/refs")).is_none());
        // Only src/A.txt and lib/mod.txt were read.
        assert_eq!(hasher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_snapshot_tree_nested_directories_close_in_order() {
        let (_tmp, proj) = project();
        fs::create_dir_all(proj.join("a/b/c")).unwrap();
        fs::write(proj.join("a/b/c/deep.txt"), "d").unwrap();
        fs::write(proj.join("a/after.txt"), "x").unwrap();
        fs::write(proj.join("z.txt"), "z").unwrap();
        let store = store_with(Arc::default());

        let node = store.snapshot_tree(&proj).unwrap();
        let names: Vec<_> = node
            .as_directory()
            .unwrap()
            .children()
            .map(|(n, _)| n.to_string())
            .collect();
        assert_eq!(names, ["a", "src", "z.txt"]);

        let a = store.cached(proj.join("a")).unwrap();
        let a_names: Vec<_> = a
            .as_directory()
            .unwrap()
            .children()
            .map(|(n, _)| n.to_string())
            .collect();
        assert_eq!(a_names, ["after.txt", "b"]);
        assert!(store.cached(proj.join("a/b/c/deep.txt")).unwrap().as_file().is_some());
        assert!(store.cached(proj.join("a/b/c")).unwrap().as_directory().unwrap().is_complete());
    }

    #[test]
    fn test_invalidating_unknown_child_makes_parent_partial() {
        let (_tmp, proj) = project();
        let store = store_with(Arc::default());
        store.snapshot_tree(&proj).unwrap();
        assert!(store.cached(&proj).unwrap().as_directory().unwrap().is_complete());

        assert_eq!(store.invalidate([proj.join("newFile.txt")]).unwrap(), 0);

        let dir = store.cached(&proj).unwrap();
        let dir = dir.as_directory().unwrap();
        assert!(!dir.is_complete());
        // Known children survive; only the claim of completeness is dropped.
        assert!(store.cached(proj.join("src/A.txt")).is_some());
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_invalidating_below_unknown_parent_changes_nothing() {
        let (_tmp, proj) = project();
        let store = store_with(Arc::default());
        store.snapshot_tree(&proj).unwrap();
        let before = store.cached(&proj);

        assert_eq!(store.invalidate([proj.join("nowhere/new.txt")]).unwrap(), 0);
        assert_eq!(store.cached(&proj), before);
    }

    #[test]
    fn test_known_directories_lists_root_with_direct_entries() {
        let store = store_with(Arc::default());
        let missing = PathBuf::from(format!("/snapwatch-absent-{}", std::process::id()));
        assert!(store.probe(&missing).unwrap().is_missing());

        let first = store.known_directories().next().unwrap();
        assert!(first.is_root());
    }

    #[test]
    fn test_known_directories_skips_root_holding_only_directories() {
        let (_tmp, proj) = project();
        let store = store_with(Arc::default());
        store.probe(proj.join("src/A.txt")).unwrap();
        assert!(store.known_directories().all(|k| !k.is_root()));
    }

    #[test]
    fn test_snapshot_tree_of_file_is_probe() {
        let (_tmp, proj) = project();
        let store = store_with(Arc::default());
        let node = store.snapshot_tree(proj.join("src/A.txt")).unwrap();
        assert!(node.as_file().is_some());
    }

    #[test]
    fn test_concurrent_probes_agree() {
        let (_tmp, proj) = project();
        for i in 0..16 {
            fs::write(proj.join("src").join(format!("f{i}.txt")), format!("{i}")).unwrap();
        }
        let store = Arc::new(store_with(Arc::default()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let proj = proj.clone();
                std::thread::spawn(move || {
                    (0..16)
                        .map(|i| store.probe(proj.join("src").join(format!("f{i}.txt"))).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for other in &results[1..] {
            assert_eq!(&results[0], other);
        }
        // Every probed file survived the races.
        let src = store.cached(proj.join("src")).unwrap();
        assert_eq!(src.as_directory().unwrap().len(), 16);
    }
}
