// src/watch/filter.rs

//! Ignore patterns.
//!
//! Patterns are shell globs evaluated against a whole path relative to the
//! watch root (`*`, `?`, `[...]`); `*` never crosses a `/`. Every pattern is
//! compiled once up front. A malformed one is logged a single time and kept
//! in the list as disabled so indices stay stable.

use std::fmt;

use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

/// A single ignore pattern and its compiled matcher.
#[derive(Clone)]
pub struct IgnorePattern {
    pattern: String,
    matcher: Option<GlobMatcher>,
}

impl fmt::Debug for IgnorePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnorePattern")
            .field("pattern", &self.pattern)
            .field("enabled", &self.enabled())
            .finish()
    }
}

impl IgnorePattern {
    fn compile(pattern: String) -> Self {
        let matcher = match GlobBuilder::new(&pattern)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
        {
            Ok(glob) => Some(glob.compile_matcher()),
            Err(err) => {
                warn!(pattern = %pattern, error = %err, "invalid ignore pattern, disabling it");
                None
            }
        };
        Self { pattern, matcher }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn enabled(&self) -> bool {
        self.matcher.is_some()
    }

    fn is_match(&self, path: &str) -> bool {
        self.matcher.as_ref().is_some_and(|m| m.is_match(path))
    }
}

/// Ordered list of ignore patterns with a path test.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    patterns: Vec<IgnorePattern>,
}

impl PathFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| IgnorePattern::compile(p.into()))
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[IgnorePattern] {
        &self.patterns
    }

    /// True if any enabled pattern matches `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.matching_pattern(path).is_some()
    }

    /// The first enabled pattern matching `path`, if any.
    pub fn matching_pattern(&self, path: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.is_match(path))
            .map(|p| p.pattern())
    }
}
