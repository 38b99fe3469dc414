//! Snapshot store: the in-memory virtual file system.
//!
//! This module provides:
//! - Case-aware path keys
//! - Snapshot nodes for missing paths, regular files and directories
//! - Pluggable content hashing (BLAKE3 by default)
//! - The shared, copy-on-write snapshot tree

mod excludes;
mod hasher;
mod node;
mod path;
mod store;

pub use excludes::{validate_pattern, DefaultExcludes, DEFAULT_EXCLUDES};
pub use hasher::{Blake3Hasher, FileHasher, HashCode};
pub use node::{DirectorySnapshot, FileSnapshot, SnapshotNode};
pub use path::{CaseSensitivity, PathKey};
pub use store::{KnownDirectories, SnapshotStore};
