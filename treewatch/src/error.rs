//! Error types for the tree watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur in the tree watcher.
///
/// Only the setup path ever returns these to a caller. Failures of individual
/// watches, listings and stats after setup are absorbed by the watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The root path does not exist.
    #[error("invalid watch path: {}", .0.display())]
    InvalidRoot(PathBuf),

    /// The root path exists but is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl WatcherError {
    /// Whether this error is about the root path the caller passed in.
    pub fn is_invalid_root(&self) -> bool {
        matches!(self, Self::InvalidRoot(_) | Self::NotADirectory(_))
    }
}
