//! Shell-style name patterns (`*`, `?`, `[...]`)

use globset::{GlobBuilder, GlobMatcher};
use std::fmt;

/// Pattern matched against container names and host directories
///
/// `*` also matches path separators. Backslashes are treated as path
/// separators on both sides, so Windows paths can be written as-is.
/// Matching is case-insensitive on Windows.
#[derive(Debug, Clone)]
pub struct NamePattern {
    pattern: String,
    matcher: GlobMatcher,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self, globset::Error> {
        let matcher = GlobBuilder::new(&normalize_separators(pattern))
            .literal_separator(false)
            .backslash_escape(false)
            .case_insensitive(cfg!(windows))
            .build()?
            .compile_matcher();

        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
        })
    }

    /// Pattern matching everything
    pub fn any() -> Self {
        Self::new("*").expect("`*` is a valid glob")
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.matcher.is_match(normalize_separators(candidate))
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

fn normalize_separators(s: &str) -> String {
    s.replace('\\', "/")
}

impl Default for NamePattern {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
