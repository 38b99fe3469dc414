//! Case-aware path keys for the snapshot tree.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;

/// How path segments are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseSensitivity {
    /// `Foo` and `foo` are different entries.
    CaseSensitive,
    /// `Foo` and `foo` are the same entry; the first spelling seen is kept.
    CaseInsensitive,
}

impl CaseSensitivity {
    /// The mode of the file systems usually found on this platform.
    #[must_use]
    pub const fn for_current_platform() -> Self {
        if cfg!(any(windows, target_os = "macos")) {
            Self::CaseInsensitive
        } else {
            Self::CaseSensitive
        }
    }

    /// Normalize a segment for comparison under this mode.
    #[must_use]
    pub fn fold(self, segment: &str) -> Cow<'_, str> {
        match self {
            Self::CaseSensitive => Cow::Borrowed(segment),
            Self::CaseInsensitive => {
                if segment.is_ascii() && !segment.bytes().any(|b| b.is_ascii_uppercase()) {
                    Cow::Borrowed(segment)
                } else {
                    Cow::Owned(segment.to_lowercase())
                }
            }
        }
    }

    /// Compare two segments under this mode.
    #[must_use]
    pub fn segments_equal(self, a: &str, b: &str) -> bool {
        match self {
            Self::CaseSensitive => a == b,
            Self::CaseInsensitive => self.fold(a) == self.fold(b),
        }
    }

    #[must_use]
    pub const fn is_case_sensitive(self) -> bool {
        matches!(self, Self::CaseSensitive)
    }
}

impl Default for CaseSensitivity {
    fn default() -> Self {
        Self::for_current_platform()
    }
}

impl fmt::Display for CaseSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaseSensitive => f.write_str("case-sensitive"),
            Self::CaseInsensitive => f.write_str("case-insensitive"),
        }
    }
}

impl FromStr for CaseSensitivity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sensitive" | "case-sensitive" => Ok(Self::CaseSensitive),
            "insensitive" | "case-insensitive" => Ok(Self::CaseInsensitive),
            other => Err(format!(
                "unknown case sensitivity '{other}', expected 'sensitive' or 'insensitive'"
            )),
        }
    }
}

/// An absolute path split into segments.
///
/// Equality and hashing fold every segment with the key's [`CaseSensitivity`],
/// so a case-insensitive key for `/Proj/SRC` equals the one for `/proj/src`
/// while still displaying the spelling it was built from. The empty key is
/// the file system root.
#[derive(Debug, Clone)]
pub struct PathKey {
    segments: Vec<String>,
    case_sensitivity: CaseSensitivity,
}

impl PathKey {
    /// The file system root.
    #[must_use]
    pub const fn root(case_sensitivity: CaseSensitivity) -> Self {
        Self {
            segments: Vec::new(),
            case_sensitivity,
        }
    }

    /// Build a key from an absolute path, resolving `.` and `..` lexically.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is relative or has a non UTF-8 segment.
    pub fn from_path(
        path: impl AsRef<Path>,
        case_sensitivity: CaseSensitivity,
    ) -> std::result::Result<Self, SnapshotError> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(SnapshotError::invalid_path(
                path.display().to_string(),
                "path must be absolute",
            ));
        }

        let mut key = Self::root(case_sensitivity);
        for component in path.components() {
            match component {
                Component::Prefix(prefix) => {
                    key.segments.push(utf8_segment(path, prefix.as_os_str())?);
                }
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir => key.pop_normal(),
                Component::Normal(name) => key.segments.push(utf8_segment(path, name)?),
            }
        }
        Ok(key)
    }

    /// Resolve a path relative to this key.
    ///
    /// An empty `relative` yields this key unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if `relative` is absolute or has a non UTF-8 segment.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> std::result::Result<Self, SnapshotError> {
        let relative = relative.as_ref();
        let mut key = self.clone();
        for component in relative.components() {
            match component {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(SnapshotError::invalid_path(
                        relative.display().to_string(),
                        "expected a relative path",
                    ));
                }
                Component::CurDir => {}
                Component::ParentDir => key.pop_normal(),
                Component::Normal(name) => key.segments.push(utf8_segment(relative, name)?),
            }
        }
        Ok(key)
    }

    /// The key of a direct child.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let mut key = self.clone();
        key.segments.push(name.to_string());
        key
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut key = self.clone();
        key.segments.pop();
        Some(key)
    }

    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub const fn case_sensitivity(&self) -> CaseSensitivity {
        self.case_sensitivity
    }

    /// Segments folded for tree lookups.
    pub(crate) fn folded_segments(&self) -> Vec<String> {
        self.segments
            .iter()
            .map(|s| self.case_sensitivity.fold(s).into_owned())
            .collect()
    }

    /// Convert back to an OS path.
    #[must_use]
    #[cfg(not(windows))]
    pub fn to_path_buf(&self) -> PathBuf {
        let mut path = PathBuf::from(std::path::MAIN_SEPARATOR_STR);
        path.extend(&self.segments);
        path
    }

    /// Convert back to an OS path.
    #[must_use]
    #[cfg(windows)]
    pub fn to_path_buf(&self) -> PathBuf {
        let mut segments = self.segments.iter();
        let Some(prefix) = segments.next() else {
            return PathBuf::from(std::path::MAIN_SEPARATOR_STR);
        };
        let mut path = PathBuf::from(format!("{prefix}{}", std::path::MAIN_SEPARATOR));
        path.extend(segments);
        path
    }

    fn pop_normal(&mut self) {
        // Never climb above a drive prefix.
        if cfg!(windows) && self.segments.len() == 1 {
            return;
        }
        self.segments.pop();
    }
}

fn utf8_segment(
    path: &Path,
    segment: &std::ffi::OsStr,
) -> std::result::Result<String, SnapshotError> {
    segment.to_str().map(str::to_string).ok_or_else(|| {
        SnapshotError::invalid_path(path.display().to_string(), "path is not valid UTF-8")
    })
}

impl PartialEq for PathKey {
    fn eq(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| self.case_sensitivity.segments_equal(a, b))
    }
}

impl Eq for PathKey {}

impl Hash for PathKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.len().hash(state);
        for segment in &self.segments {
            self.case_sensitivity.fold(segment).hash(state);
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path_buf().display())
    }
}
