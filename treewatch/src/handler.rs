//! Change notification capability.

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::error;

/// Receives one notification per debounced change.
///
/// Called on the watcher's dispatcher thread. Work done here delays the
/// processing of further events, so long-running work should be handed off.
pub trait ChangeHandler: Send + 'static {
    /// Something changed at `path`.
    fn on_change(&self, path: &Path);
}

impl<F> ChangeHandler for F
where
    F: Fn(&Path) + Send + 'static,
{
    fn on_change(&self, path: &Path) {
        self(path)
    }
}

/// Decides whether the handler may still run.
///
/// Delivery holds the gate's lock for the duration of the handler call, so
/// once [`DeliveryGate::close`] returns no call is running or will start. The
/// lock is re-entrant: a handler that closes the gate from inside a call does
/// not deadlock.
#[derive(Clone)]
pub(crate) struct DeliveryGate {
    open: Arc<ReentrantMutex<Cell<bool>>>,
}

impl DeliveryGate {
    pub(crate) fn new() -> Self {
        Self {
            open: Arc::new(ReentrantMutex::new(Cell::new(true))),
        }
    }

    /// Run the handler for `path` if the gate is open.
    pub(crate) fn deliver(&self, handler: &dyn ChangeHandler, path: &Path) -> bool {
        let open = self.open.lock();
        if !open.get() {
            return false;
        }

        if catch_unwind(AssertUnwindSafe(|| handler.on_change(path))).is_err() {
            error!("Change handler panicked for {}", path.display());
        }
        true
    }

    /// Close the gate. Returns whether it was open.
    pub(crate) fn close(&self) -> bool {
        self.open.lock().replace(false)
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.open.lock().get()
    }
}
