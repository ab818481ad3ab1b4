//! Self-healing for failed watches.
//!
//! A failed watch is released immediately and re-registered after a fixed
//! backoff. A retry that fails re-enters the loop, so a directory that stays
//! unavailable is retried once per backoff until it comes back or the watch is
//! torn down. Failures are never reported to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::backend::WatchBackend;
use crate::debounce::DebounceScheduler;
use crate::registry::WatchRegistry;
use crate::timer::Timer;

/// Schedules re-registration of directories whose watch failed.
///
/// At most one retry is pending per path; another failure for the same path
/// re-arms it.
pub struct RecoveryLoop {
    retries: DebounceScheduler<PathBuf, ()>,
}

impl RecoveryLoop {
    /// Create a loop that reports due retries as `(path, generation)` through
    /// `on_due`. The owner completes them with [`RecoveryLoop::retry`].
    pub fn new(
        timer: Arc<dyn Timer>,
        backoff: Duration,
        on_due: impl Fn(PathBuf, u64) + Send + Sync + 'static,
    ) -> Self {
        Self {
            retries: DebounceScheduler::new(timer, backoff, on_due),
        }
    }

    /// The fixed delay before a retry.
    pub fn backoff(&self) -> Duration {
        self.retries.delay()
    }

    /// Release the failed watch on `path` and everything watched beneath it,
    /// then schedule re-registration of the subtree.
    pub fn on_watch_error<B: WatchBackend>(
        &mut self,
        registry: &mut WatchRegistry<B>,
        path: &Path,
    ) {
        registry.deregister_subtree(path);
        if registry.is_closed() {
            return;
        }

        debug!(
            "Retrying watch on {} in {:?}",
            path.display(),
            self.retries.delay()
        );
        self.retries.schedule(path.to_path_buf(), ());
    }

    /// Run a due retry.
    ///
    /// Returns `true` if the directory is watched again. A failed attempt
    /// schedules the next one. Stale or cancelled retries do nothing.
    pub fn retry<B: WatchBackend>(
        &mut self,
        registry: &mut WatchRegistry<B>,
        path: &Path,
        generation: u64,
    ) -> bool {
        if self
            .retries
            .expire(&path.to_path_buf(), generation)
            .is_none()
        {
            return false;
        }
        if registry.is_closed() {
            return false;
        }

        match registry.register_tree(path, false) {
            Ok(count) => {
                info!(
                    "Recovered watch on {} ({count} new directories)",
                    path.display()
                );
                true
            }
            Err(e) => {
                debug!("Retry of {} failed: {e}", path.display());
                self.on_watch_error(registry, path);
                false
            }
        }
    }

    /// Drop every pending retry.
    pub fn cancel_all(&mut self) -> usize {
        self.retries.cancel_all()
    }

    /// Number of pending retries.
    pub fn pending(&self) -> usize {
        self.retries.pending()
    }

    /// Whether a retry is pending for `path`.
    pub fn is_pending(&self, path: &Path) -> bool {
        self.retries.is_pending(&path.to_path_buf())
    }
}
