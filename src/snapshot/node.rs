//! Snapshot node types.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use super::hasher::HashCode;
use super::path::CaseSensitivity;

/// Observed state of one path.
///
/// A path with no node at all is *unknown*, which is different from
/// [`SnapshotNode::Missing`]: the latter was probed and is known to be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotNode {
    /// Probed and confirmed absent.
    Missing,
    /// A regular file.
    RegularFile(FileSnapshot),
    /// A directory, possibly with only some of its children known.
    Directory(DirectorySnapshot),
}

impl SnapshotNode {
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    #[must_use]
    pub const fn is_directory(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    #[must_use]
    pub const fn as_file(&self) -> Option<&FileSnapshot> {
        match self {
            Self::RegularFile(file) => Some(file),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_directory(&self) -> Option<&DirectorySnapshot> {
        match self {
            Self::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// Number of nodes in this subtree, this one included.
    #[must_use]
    pub fn subtree_len(&self) -> usize {
        match self {
            Self::Directory(dir) => 1 + dir.entries().map(|e| e.node.subtree_len()).sum::<usize>(),
            _ => 1,
        }
    }
}

/// Observed state of a regular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub content_hash: HashCode,
    pub size: u64,
    /// Modification time, when the platform reports one.
    pub last_modified: Option<SystemTime>,
}

/// A directory's known children.
///
/// Children are keyed by their folded name, so lookups honour the store's
/// case sensitivity while each entry keeps the spelling it was found with.
/// The map is shared between tree versions and only copied on write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectorySnapshot {
    children: Arc<BTreeMap<String, ChildEntry>>,
    complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChildEntry {
    pub(crate) name: String,
    pub(crate) node: Arc<SnapshotNode>,
}

impl DirectorySnapshot {
    /// A directory whose children have not been enumerated.
    #[must_use]
    pub fn partial() -> Self {
        Self::default()
    }

    /// Whether every child on disk was recorded when this node was built.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Look up a child by name under the given case sensitivity.
    #[must_use]
    pub fn child(&self, name: &str, case_sensitivity: CaseSensitivity) -> Option<&SnapshotNode> {
        self.get(&case_sensitivity.fold(name))
            .map(|entry| entry.node.as_ref())
    }

    /// Known children with their original spelling.
    pub fn children(&self) -> impl Iterator<Item = (&str, &SnapshotNode)> {
        self.entries().map(|e| (e.name.as_str(), e.node.as_ref()))
    }

    pub(crate) fn complete(children: BTreeMap<String, ChildEntry>) -> Self {
        Self {
            children: Arc::new(children),
            complete: true,
        }
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &ChildEntry> {
        self.children.values()
    }

    pub(crate) fn get(&self, folded: &str) -> Option<&ChildEntry> {
        self.children.get(folded)
    }

    pub(crate) fn with_child(&self, folded: &str, entry: ChildEntry) -> Self {
        let mut updated = self.clone();
        Arc::make_mut(&mut updated.children).insert(folded.to_string(), entry);
        updated
    }

    pub(crate) fn without_child(&self, folded: &str) -> Self {
        let mut updated = self.as_partial();
        Arc::make_mut(&mut updated.children).remove(folded);
        updated
    }

    /// The same children, no longer claiming to be the full listing.
    pub(crate) fn as_partial(&self) -> Self {
        Self {
            children: Arc::clone(&self.children),
            complete: false,
        }
    }

    /// Union of two views of the same directory; entries already in `self` win.
    pub(crate) fn merged_with(&self, incoming: &Self) -> Self {
        let mut merged = self.clone();
        merged.complete = self.complete || incoming.complete;
        for (folded, entry) in incoming.children.iter() {
            let combined = match self.children.get(folded) {
                None => entry.clone(),
                Some(existing) => match (existing.node.as_ref(), entry.node.as_ref()) {
                    (SnapshotNode::Directory(old), SnapshotNode::Directory(new)) => ChildEntry {
                        name: existing.name.clone(),
                        node: Arc::new(SnapshotNode::Directory(old.merged_with(new))),
                    },
                    _ => continue,
                },
            };
            Arc::make_mut(&mut merged.children).insert(folded.clone(), combined);
        }
        merged
    }
}
