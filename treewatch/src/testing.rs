//! Scripted backend for unit tests.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::backend::WatchBackend;
use crate::error::{Result, WatcherError};

#[derive(Default)]
struct FakeState {
    watched: BTreeSet<PathBuf>,
    failing: HashSet<PathBuf>,
    watch_calls: Vec<PathBuf>,
    unwatch_calls: Vec<PathBuf>,
}

/// Backend that records calls and fails on demand. Clones share state.
#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    /// Make every watch of `path` fail until [`FakeBackend::heal`].
    pub(crate) fn fail(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().failing.insert(path.into());
    }

    pub(crate) fn heal(&self, path: &Path) {
        self.state.lock().unwrap().failing.remove(path);
    }

    pub(crate) fn watched(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().watched.iter().cloned().collect()
    }

    pub(crate) fn watch_calls(&self, path: &Path) -> usize {
        let state = self.state.lock().unwrap();
        state.watch_calls.iter().filter(|p| p.as_path() == path).count()
    }

    pub(crate) fn total_watch_calls(&self) -> usize {
        self.state.lock().unwrap().watch_calls.len()
    }

    pub(crate) fn unwatch_calls(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().unwatch_calls.clone()
    }
}

impl WatchBackend for FakeBackend {
    type Handle = PathBuf;

    fn watch(&mut self, path: &Path) -> Result<PathBuf> {
        let mut state = self.state.lock().unwrap();
        state.watch_calls.push(path.to_path_buf());
        if state.failing.contains(path) {
            return Err(WatcherError::Notify(
                notify::Error::path_not_found().add_path(path.to_path_buf()),
            ));
        }
        state.watched.insert(path.to_path_buf());
        Ok(path.to_path_buf())
    }

    fn unwatch(&mut self, handle: PathBuf) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.unwatch_calls.push(handle.clone());
        state.watched.remove(&handle);
        Ok(())
    }
}

/// Temporary directory whose name is not hidden, so the default ignore set
/// does not swallow the root.
pub(crate) fn visible_tempdir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("treewatch")
        .tempdir()
        .unwrap()
}
