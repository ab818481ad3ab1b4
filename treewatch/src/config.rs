//! Configuration for a tree watch.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};
use crate::ignore::{IgnoreFilter, IgnorePattern};

/// Default quiet period before a change is reported.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Default delay before a failed watch is re-registered.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;

/// Configuration for watching a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Names excluded from observation.
    pub ignore: Vec<IgnorePattern>,

    /// Quiet period in milliseconds before a change is reported.
    pub debounce_ms: u64,

    /// Delay in milliseconds before a failed watch is retried.
    pub retry_backoff_ms: u64,
}

impl WatchConfig {
    /// Create a config with the default ignore set and timings.
    pub fn new() -> Self {
        Self {
            ignore: IgnoreFilter::default_patterns(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the debounce delay.
    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Ignore entries with exactly this name.
    pub fn ignore_name(mut self, name: impl Into<String>) -> Self {
        self.ignore.push(IgnorePattern::Name(name.into()));
        self
    }

    /// Ignore entries whose name starts with this prefix.
    pub fn ignore_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ignore.push(IgnorePattern::Prefix(prefix.into()));
        self
    }

    /// Drop the built-in ignore set.
    pub fn without_default_ignores(mut self) -> Self {
        let defaults = IgnoreFilter::default_patterns();
        self.ignore.retain(|p| !defaults.contains(p));
        self
    }

    /// Debounce delay as a duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Retry backoff as a duration.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Build the ignore filter for this config.
    pub fn filter(&self) -> IgnoreFilter {
        IgnoreFilter::new(self.ignore.clone())
    }

    /// Reject patterns that would match every name.
    pub fn validate(&self) -> Result<()> {
        for pattern in &self.ignore {
            if let IgnorePattern::Prefix(prefix) = pattern {
                if prefix.is_empty() {
                    return Err(WatcherError::Config(
                        "empty ignore prefix would exclude everything".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::new()
    }
}
