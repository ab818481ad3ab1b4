//! The OS directory-change primitive.

use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::Result;

/// Registers and releases single-directory watches.
///
/// Each watch covers one directory non-recursively; subtrees are covered by
/// registering every directory in them.
pub trait WatchBackend: Send {
    /// Opaque handle kept for the lifetime of a watch.
    type Handle: Send;

    /// Start watching a directory.
    fn watch(&mut self, path: &Path) -> Result<Self::Handle>;

    /// Stop watching a directory.
    fn unwatch(&mut self, handle: Self::Handle) -> Result<()>;
}

/// Backend sharing one platform watcher between all watched directories.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
}

impl NotifyBackend {
    /// Create the platform watcher. Raw events and errors are passed to
    /// `on_event` on the platform watcher's own thread.
    pub fn new(
        on_event: impl Fn(notify::Result<notify::Event>) + Send + 'static,
    ) -> Result<Self> {
        let watcher = notify::recommended_watcher(on_event)?;
        Ok(Self { watcher })
    }
}

impl WatchBackend for NotifyBackend {
    type Handle = PathBuf;

    fn watch(&mut self, path: &Path) -> Result<PathBuf> {
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(path.to_path_buf())
    }

    fn unwatch(&mut self, handle: PathBuf) -> Result<()> {
        self.watcher.unwatch(&handle)?;
        Ok(())
    }
}
