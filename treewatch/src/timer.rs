//! Cancellable deadlines.
//!
//! The debounce scheduler and the recovery loop only need "run this once after
//! a delay, unless cancelled first". [`Timer`] captures that capability so the
//! timing primitive can be swapped out.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Action run when a deadline expires.
pub type Expiry = Box<dyn FnOnce() + Send + 'static>;

/// An armed deadline that can be cancelled before it expires.
pub trait Deadline: Send {
    /// Cancel the deadline. Cancelling an expired deadline has no effect.
    fn cancel(&self);
}

/// Arms cancellable deadlines.
pub trait Timer: Send + Sync {
    /// Run `on_expire` once after `delay`, unless the returned deadline is
    /// cancelled first.
    fn arm(&self, delay: Duration, on_expire: Expiry) -> Box<dyn Deadline>;
}

/// Timer backed by tokio sleep tasks on a runtime handle.
#[derive(Debug, Clone)]
pub struct TokioTimer {
    handle: Handle,
}

impl TokioTimer {
    /// Create a timer that spawns onto the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Create a timer on the runtime the caller is running in.
    ///
    /// Returns `None` outside a tokio runtime.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Timer for TokioTimer {
    fn arm(&self, delay: Duration, on_expire: Expiry) -> Box<dyn Deadline> {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            on_expire();
        });
        Box::new(TaskDeadline(task))
    }
}

struct TaskDeadline(JoinHandle<()>);

impl Deadline for TaskDeadline {
    fn cancel(&self) {
        self.0.abort();
    }
}
