//! # treewatch
//!
//! Recursive directory watching built on single-directory OS watches.
//!
//! ## Features
//!
//! - **Whole-tree coverage**: every non-ignored directory under the root is
//!   watched, including directories created after the watch started
//! - **Debouncing**: a burst of raw events for one path becomes one
//!   notification, delivered after a quiet period
//! - **Exclusion**: hidden names, `node_modules` and OS trash/metadata
//!   directories are never watched or reported
//! - **Self-healing**: a failed watch is released and retried after a backoff
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Dispatcher                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  WatchBackend ──► IgnoreFilter ──► DebounceScheduler ──► handler │
//! │       │                                                          │
//! │       ▼                                                          │
//! │  WatchRegistry ◄── RecoveryLoop                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! let handle = treewatch::watch_directory(".", |path: &Path| {
//!     println!("File changed: {}", path.display());
//! })?;
//!
//! // ...
//!
//! handle.stop();
//! # Ok::<(), treewatch::WatcherError>(())
//! ```

pub mod backend;
pub mod config;
pub mod debounce;
pub mod error;
pub mod handler;
pub mod ignore;
pub mod recovery;
pub mod registry;
pub mod timer;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use backend::{NotifyBackend, WatchBackend};
pub use config::WatchConfig;
pub use debounce::DebounceScheduler;
pub use error::{Result, WatcherError};
pub use handler::ChangeHandler;
pub use ignore::{IgnoreFilter, IgnorePattern};
pub use recovery::RecoveryLoop;
pub use registry::{WatchEntry, WatchRegistry};
pub use timer::{Deadline, Timer, TokioTimer};
pub use watcher::{WatchHandle, watch_directory, watch_directory_with_config};
