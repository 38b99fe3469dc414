//! Names that are never recorded in the snapshot tree.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use super::path::CaseSensitivity;
use crate::{Error, Result};

/// VCS metadata and editor droppings skipped by default.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "%*%",
    ".#*",
    "#*#",
    "*~",
    "._*",
    ".DS_Store",
    ".git",
    ".gitattributes",
    ".gitignore",
    ".gitmodules",
    ".hg",
    ".hgignore",
    ".hgsub",
    ".hgsubstate",
    ".hgtags",
    ".bzr",
    ".bzrignore",
    ".svn",
    "CVS",
    ".cvsignore",
    "SCCS",
    "vssver.scc",
];

/// Single-segment glob patterns matched against file names.
#[derive(Debug, Clone)]
pub struct DefaultExcludes {
    matcher: Gitignore,
    patterns: Vec<String>,
}

impl DefaultExcludes {
    /// Build a matcher from name patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern contains a path separator or is not a
    /// valid glob.
    pub fn new<S: AsRef<str>>(patterns: &[S], case_sensitivity: CaseSensitivity) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(".");
        builder
            .case_insensitive(!case_sensitivity.is_case_sensitive())
            .map_err(|e| Error::config(format!("failed to configure excludes: {e}")))?;

        let mut kept = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = pattern.as_ref();
            validate_pattern(pattern)?;
            builder
                .add_line(None, &escape_leading(pattern))
                .map_err(|e| Error::config(format!("invalid exclude pattern '{pattern}': {e}")))?;
            kept.push(pattern.to_string());
        }

        let matcher = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build excludes: {e}")))?;

        Ok(Self {
            matcher,
            patterns: kept,
        })
    }

    /// The [`DEFAULT_EXCLUDES`] list.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in list; the signature mirrors [`Self::new`].
    pub fn standard(case_sensitivity: CaseSensitivity) -> Result<Self> {
        Self::new(DEFAULT_EXCLUDES, case_sensitivity)
    }

    /// A matcher that excludes nothing.
    #[must_use]
    pub fn none() -> Self {
        Self {
            matcher: Gitignore::empty(),
            patterns: Vec::new(),
        }
    }

    /// Check whether a single path segment is excluded.
    #[must_use]
    pub fn is_excluded(&self, name: &str) -> bool {
        !self.patterns.is_empty() && self.matcher.matched(Path::new(name), false).is_ignore()
    }

    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Check that a pattern names a single segment.
///
/// # Errors
///
/// Returns a configuration error for empty patterns or ones with separators.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(Error::config("exclude pattern cannot be empty"));
    }
    if pattern.contains('/') || pattern.contains('\\') {
        return Err(Error::config(format!(
            "exclude pattern '{pattern}' must match a single file name"
        )));
    }
    Ok(())
}

// `#` starts a comment and `!` negates in gitignore syntax.
fn escape_leading(pattern: &str) -> String {
    if pattern.starts_with('#') || pattern.starts_with('!') {
        format!("\\{pattern}")
    } else {
        pattern.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_excludes_vcs_directories() {
        let excludes = DefaultExcludes::standard(CaseSensitivity::CaseSensitive).unwrap();
        assert!(excludes.is_excluded(".git"));
        assert!(excludes.is_excluded(".svn"));
        assert!(excludes.is_excluded("CVS"));
        assert!(excludes.is_excluded(".DS_Store"));
        assert!(!excludes.is_excluded("src"));
        assert!(!excludes.is_excluded("main.rs"));
    }

    #[test]
    fn test_standard_excludes_editor_files() {
        let excludes = DefaultExcludes::standard(CaseSensitivity::CaseSensitive).unwrap();
        assert!(excludes.is_excluded("notes.txt~"));
        assert!(excludes.is_excluded("#scratch#"));
        assert!(excludes.is_excluded(".#lockfile"));
        assert!(excludes.is_excluded("._resource"));
        assert!(!excludes.is_excluded("notes.txt"));
    }

    #[test]
    fn test_case_insensitive_matching() {
        let excludes = DefaultExcludes::standard(CaseSensitivity::CaseInsensitive).unwrap();
        assert!(excludes.is_excluded("cvs"));

        let strict = DefaultExcludes::standard(CaseSensitivity::CaseSensitive).unwrap();
        assert!(!strict.is_excluded("cvs"));
    }

    #[test]
    fn test_custom_patterns() {
        let excludes =
            DefaultExcludes::new(&["*.tmp", "build"], CaseSensitivity::CaseSensitive).unwrap();
        assert!(excludes.is_excluded("a.tmp"));
        assert!(excludes.is_excluded("build"));
        assert!(!excludes.is_excluded(".git"));
        assert_eq!(excludes.patterns(), ["*.tmp", "build"]);
    }

    #[test]
    fn test_rejects_multi_segment_pattern() {
        let err = DefaultExcludes::new(&["a/b"], CaseSensitivity::CaseSensitive).unwrap_err();
        assert!(err.to_string().contains("single file name"));
        assert!(DefaultExcludes::new(&[""], CaseSensitivity::CaseSensitive).is_err());
    }

    #[test]
    fn test_none_excludes_nothing() {
        let excludes = DefaultExcludes::none();
        assert!(!excludes.is_excluded(".git"));
        assert!(excludes.patterns().is_empty());
    }
}
