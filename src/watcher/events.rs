//! Watch event types.

#![allow(clippy::missing_const_for_fn)]

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Classes of change a watch can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    /// The OS dropped change records for the watched directory.
    Overflow,
}

/// Every event class; what the registrar asks for.
pub const ALL_EVENT_KINDS: [EventKind; 4] = [
    EventKind::Created,
    EventKind::Modified,
    EventKind::Deleted,
    EventKind::Overflow,
];

/// How eagerly the OS should report changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sensitivity {
    Low,
    Medium,
    /// Report as soon as possible.
    #[default]
    High,
}

/// A change queued on a watch handle.
///
/// `name` is relative to the handle's directory; an empty name refers to the
/// directory itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingEvent {
    Created { name: PathBuf },
    Modified { name: PathBuf },
    Deleted { name: PathBuf },
    Overflow,
}

impl PendingEvent {
    /// Build an event of `kind` for `name`. `name` is dropped for overflow.
    #[must_use]
    pub fn new(kind: EventKind, name: impl Into<PathBuf>) -> Self {
        let name = name.into();
        match kind {
            EventKind::Created => Self::Created { name },
            EventKind::Modified => Self::Modified { name },
            EventKind::Deleted => Self::Deleted { name },
            EventKind::Overflow => Self::Overflow,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Created { .. } => EventKind::Created,
            Self::Modified { .. } => EventKind::Modified,
            Self::Deleted { .. } => EventKind::Deleted,
            Self::Overflow => EventKind::Overflow,
        }
    }

    /// The changed entry, relative to the watched directory.
    #[must_use]
    pub fn name(&self) -> Option<&Path> {
        match self {
            Self::Created { name } | Self::Modified { name } | Self::Deleted { name } => {
                Some(name)
            }
            Self::Overflow => None,
        }
    }

    #[must_use]
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow)
    }
}
