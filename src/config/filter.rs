//! Ignore/include path filters.
//!
//! The pipeline only sees [`PathFilter::excludes`]; how paths are matched
//! is a [`PathMatcher`] implementation:
//!
//! | Matcher        | Config keys                          | Semantics                  |
//! |----------------|--------------------------------------|----------------------------|
//! | `GlobMatcher`  | `ignorePatterns` / `includePatterns` | gitignore-flavored globs   |
//! | `RegexMatcher` | `ignoreRegex` / `includeRegex`       | unanchored regex search    |
//!
//! Candidate paths are made relative to the project root when they lie
//! inside it, for both matchers. An anchored regex therefore starts at
//! the root-relative path (`^assets/raw/`), not at `/`. Paths outside the
//! root are matched as given.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Predicate over project-relative paths.
pub trait PathMatcher: fmt::Debug + Send + Sync {
    fn is_match(&self, path: &Path) -> bool;

    /// Short human-readable form, used in logs and `config` output.
    fn describe(&self) -> String;
}

// ============================================================================
// Glob
// ============================================================================

/// Glob pattern list.
///
/// Patterns without a `/` match at any depth, a leading `/` anchors to
/// the root, a trailing `/` matches everything below a directory. `*`
/// never crosses a path separator, `**` does.
#[derive(Debug)]
pub struct GlobMatcher {
    set: GlobSet,
    patterns: Vec<String>,
}

impl GlobMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            for expanded in expand_pattern(pattern.as_ref()) {
                builder.add(GlobBuilder::new(&expanded).literal_separator(true).build()?);
            }
        }

        Ok(Self {
            set: builder.build()?,
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
        })
    }
}

impl PathMatcher for GlobMatcher {
    fn is_match(&self, path: &Path) -> bool {
        self.set.is_match(path)
    }

    fn describe(&self) -> String {
        format!("patterns {:?}", self.patterns)
    }
}

/// Rewrite a gitignore-style pattern into plain globs over relative paths.
fn expand_pattern(pattern: &str) -> Vec<String> {
    let pattern = pattern.trim();

    if let Some(dir) = pattern.strip_suffix('/') {
        return expand_pattern(dir)
            .into_iter()
            .filter(|p| !p.ends_with("/**"))
            .map(|p| format!("{p}/**"))
            .collect();
    }

    if let Some(anchored) = pattern.strip_prefix('/') {
        return vec![anchored.to_string(), format!("{anchored}/**")];
    }

    if pattern.contains('/') {
        vec![pattern.to_string(), format!("{pattern}/**")]
    } else {
        vec![format!("**/{pattern}"), format!("**/{pattern}/**")]
    }
}

// ============================================================================
// Regex
// ============================================================================

/// Single regular expression searched anywhere in the root-relative path.
#[derive(Debug)]
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }
}

impl PathMatcher for RegexMatcher {
    fn is_match(&self, path: &Path) -> bool {
        self.regex.is_match(&path.to_string_lossy())
    }

    fn describe(&self) -> String {
        format!("regex /{}/", self.regex.as_str())
    }
}

// ============================================================================
// PathFilter
// ============================================================================

/// Whether matching paths are skipped or are the only ones converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Ignore,
    Include,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => f.write_str("ignore"),
            Self::Include => f.write_str("include"),
        }
    }
}

/// A configured path filter.
#[derive(Debug, Clone)]
pub struct PathFilter {
    mode: FilterMode,
    matcher: Arc<dyn PathMatcher>,
}

impl PathFilter {
    pub fn new(mode: FilterMode, matcher: Arc<dyn PathMatcher>) -> Self {
        Self { mode, matcher }
    }

    pub const fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Check whether `path` must be left unconverted.
    pub fn excludes(&self, path: &Path, root: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let matched = self.matcher.is_match(relative);
        match self.mode {
            FilterMode::Ignore => matched,
            FilterMode::Include => !matched,
        }
    }
}

impl fmt::Display for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.mode, self.matcher.describe())
    }
}

impl Serialize for PathFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
