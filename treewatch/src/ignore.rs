//! Name-based exclusion rules.
//!
//! Patterns are matched against the final component of a path only. A match
//! excludes the path and, for directories, everything beneath it, because the
//! traversal never descends into an ignored directory.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Directory where package managers install dependencies.
pub const DEPENDENCY_DIR: &str = "node_modules";

/// Windows recycle bin directory.
pub const RECYCLE_BIN_DIR: &str = "$RECYCLE.BIN";

/// Windows volume metadata directory.
pub const VOLUME_METADATA_DIR: &str = "System Volume Information";

/// A single exclusion rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum IgnorePattern {
    /// Name starts with the given prefix.
    Prefix(String),

    /// Name equals the given string, ignoring ASCII case.
    Name(String),
}

impl IgnorePattern {
    /// Check a single file name against this pattern.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Self::Name(exact) => name.eq_ignore_ascii_case(exact),
        }
    }
}

/// Pure predicate deciding whether a path is ever observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreFilter {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreFilter {
    /// Create a filter from a fixed set of patterns.
    pub fn new(patterns: Vec<IgnorePattern>) -> Self {
        Self { patterns }
    }

    /// Hidden names, dependency directories and OS trash/metadata directories.
    pub fn default_patterns() -> Vec<IgnorePattern> {
        vec![
            IgnorePattern::Prefix(".".to_string()),
            IgnorePattern::Name(DEPENDENCY_DIR.to_string()),
            IgnorePattern::Name(RECYCLE_BIN_DIR.to_string()),
            IgnorePattern::Name(VOLUME_METADATA_DIR.to_string()),
        ]
    }

    /// The patterns this filter applies.
    pub fn patterns(&self) -> &[IgnorePattern] {
        &self.patterns
    }

    /// Check if a path should be ignored.
    ///
    /// Paths without a final component, such as `/`, are never ignored.
    pub fn should_ignore(&self, path: &Path) -> bool {
        match path.file_name() {
            Some(name) => self.is_ignored_name(&name.to_string_lossy()),
            None => false,
        }
    }

    /// Check a bare file name.
    pub fn is_ignored_name(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        Self::new(Self::default_patterns())
    }
}
