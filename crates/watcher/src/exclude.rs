//! Exclusion patterns for watched directories
//!
//! Patterns use gitignore syntax and are evaluated relative to the watched
//! host directory. A path is excluded when it or any of its parent
//! directories matches, so `node_modules` hides everything beneath it.

use crate::WatchError;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// Compiled exclusion patterns rooted at one host directory
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    root: PathBuf,
    patterns: Vec<String>,
    matcher: Gitignore,
}

impl ExcludeRules {
    /// Compile `patterns` for paths under `root`
    pub fn new<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<Self, WatchError> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in patterns {
            let pattern = pattern.as_ref();
            builder
                .add_line(None, pattern)
                .map_err(|source| WatchError::InvalidExclude {
                    pattern: pattern.to_string(),
                    source,
                })?;
        }

        let matcher = builder.build().map_err(|source| WatchError::InvalidExclude {
            pattern: patterns
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join(" "),
            source,
        })?;

        Ok(Self {
            root: root.to_path_buf(),
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            matcher,
        })
    }

    /// Rules that exclude nothing
    pub fn none(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            patterns: Vec::new(),
            matcher: Gitignore::empty(),
        }
    }

    /// Check if `path` should be skipped
    ///
    /// Paths outside the root are never excluded here; the adapter drops
    /// them on its own.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.patterns.is_empty() || path.strip_prefix(&self.root).is_err() {
            return false;
        }

        let is_dir = path.is_dir();
        self.matcher
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
