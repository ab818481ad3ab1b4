//! The set of directories under active observation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::backend::WatchBackend;
use crate::error::{Result, WatcherError};
use crate::ignore::IgnoreFilter;

/// A live watch on one directory.
#[derive(Debug)]
pub struct WatchEntry<H> {
    /// Absolute path of the watched directory.
    pub path: PathBuf,

    handle: H,
}

/// Owns every active directory watch, keyed by absolute path.
///
/// Registration is idempotent: a path has at most one live entry.
pub struct WatchRegistry<B: WatchBackend> {
    backend: B,
    filter: IgnoreFilter,
    entries: BTreeMap<PathBuf, WatchEntry<B::Handle>>,
    closed: bool,
}

impl<B: WatchBackend> WatchRegistry<B> {
    /// Create an empty registry.
    pub fn new(backend: B, filter: IgnoreFilter) -> Self {
        Self {
            backend,
            filter,
            entries: BTreeMap::new(),
            closed: false,
        }
    }

    /// The ignore filter applied to every registration.
    pub fn filter(&self) -> &IgnoreFilter {
        &self.filter
    }

    /// Register `root` and every non-ignored directory beneath it.
    ///
    /// Fails with [`WatcherError::InvalidRoot`] before touching the backend if
    /// `root` does not exist. See [`WatchRegistry::register_tree`] for how the
    /// remaining failures are handled.
    pub fn register_subtree(&mut self, root: &Path) -> Result<usize> {
        if !root.exists() {
            return Err(WatcherError::InvalidRoot(root.to_path_buf()));
        }
        self.register_tree(root, false)
    }

    /// Register `root`, then walk its subtree registering each directory.
    ///
    /// Only a failure to stat or watch `root` itself is returned. Listing,
    /// stat and watch failures below the root skip that branch of the walk.
    /// Already registered directories are skipped along with their subtree
    /// unless `descend_registered` is set. Symbolic links are not followed.
    ///
    /// Returns the number of newly registered directories.
    pub fn register_tree(&mut self, root: &Path, descend_registered: bool) -> Result<usize> {
        if self.closed {
            return Ok(0);
        }

        if !fs::metadata(root)?.is_dir() {
            return Err(WatcherError::NotADirectory(root.to_path_buf()));
        }

        if self.filter.should_ignore(root) {
            debug!("Not watching ignored directory: {}", root.display());
            return Ok(0);
        }

        let filter = self.filter.clone();
        let mut walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| entry.depth() == 0 || !filter.should_ignore(entry.path()));

        let mut registered = 0;
        while let Some(next) = walker.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry during scan: {e}");
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if self.entries.contains_key(path) {
                if !descend_registered {
                    walker.skip_current_dir();
                }
                continue;
            }

            match self.register_path(path) {
                Ok(true) => registered += 1,
                Ok(false) => walker.skip_current_dir(),
                Err(e) if entry.depth() == 0 => return Err(e),
                Err(e) => {
                    debug!("Failed to watch {}: {e}", path.display());
                    walker.skip_current_dir();
                }
            }
        }

        Ok(registered)
    }

    /// Register a single directory.
    ///
    /// Returns `Ok(false)` without touching the backend if the path is already
    /// registered, ignored, or the registry has been torn down.
    pub fn register_path(&mut self, path: &Path) -> Result<bool> {
        if self.closed || self.entries.contains_key(path) || self.filter.should_ignore(path) {
            return Ok(false);
        }

        let handle = self.backend.watch(path)?;
        debug!("Watching directory: {}", path.display());
        self.entries.insert(
            path.to_path_buf(),
            WatchEntry {
                path: path.to_path_buf(),
                handle,
            },
        );
        Ok(true)
    }

    /// Release the watch on `path`. Returns whether an entry existed.
    pub fn deregister_path(&mut self, path: &Path) -> bool {
        match self.entries.remove(path) {
            Some(entry) => {
                if let Err(e) = self.backend.unwatch(entry.handle) {
                    debug!("Failed to release watch on {}: {e}", entry.path.display());
                }
                debug!("Stopped watching directory: {}", entry.path.display());
                true
            }
            None => false,
        }
    }

    /// Release the watch on `path` and on every watched directory beneath it.
    ///
    /// Returns the number of entries removed.
    pub fn deregister_subtree(&mut self, path: &Path) -> usize {
        let stale: Vec<PathBuf> = self
            .entries
            .range::<Path, _>((std::ops::Bound::Included(path), std::ops::Bound::Unbounded))
            .map(|(p, _)| p)
            .take_while(|p| p.starts_with(path))
            .cloned()
            .collect();

        let mut removed = 0;
        for p in stale {
            if self.deregister_path(&p) {
                removed += 1;
            }
        }
        removed
    }

    /// Release every watch and refuse all further registrations.
    pub fn teardown_all(&mut self) -> usize {
        self.closed = true;
        let entries = std::mem::take(&mut self.entries);
        let count = entries.len();
        for (path, entry) in entries {
            if let Err(e) = self.backend.unwatch(entry.handle) {
                warn!("Failed to release watch on {}: {e}", path.display());
            }
        }
        count
    }

    /// Whether `path` is currently watched.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Whether the directory containing `path` is currently watched.
    pub fn watches_parent_of(&self, path: &Path) -> bool {
        path.parent().is_some_and(|parent| self.contains(parent))
    }

    /// Number of watched directories.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no directory is watched.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Watched directories in path order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Whether [`WatchRegistry::teardown_all`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
