//! Per-key trailing-edge debouncing.
//!
//! Every [`DebounceScheduler::schedule`] for a key cancels the key's pending
//! deadline and arms a new one, so a burst of signals collapses into a single
//! action that runs one delay after the last signal.
//!
//! Expired deadlines do not run the action themselves. They report
//! `(key, generation)` through the expiry notifier, and the owner of the
//! scheduler completes them with [`DebounceScheduler::fire`]. This keeps the
//! pending map owned by a single task; a stale generation (the key was
//! re-armed after the deadline had already expired) is discarded.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::timer::{Deadline, Timer};

/// Callback receiving `(key, generation)` when a deadline expires.
pub type ExpiryNotifier<K> = Arc<dyn Fn(K, u64) + Send + Sync>;

struct Pending<A> {
    generation: u64,
    deadline: Box<dyn Deadline>,
    action: A,
}

/// Registry of cancellable per-key deadlines.
pub struct DebounceScheduler<K, A> {
    timer: Arc<dyn Timer>,
    delay: Duration,
    pending: HashMap<K, Pending<A>>,
    next_generation: u64,
    on_expired: ExpiryNotifier<K>,
}

impl<K, A> DebounceScheduler<K, A>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Create a scheduler with a default delay.
    pub fn new(
        timer: Arc<dyn Timer>,
        delay: Duration,
        on_expired: impl Fn(K, u64) + Send + Sync + 'static,
    ) -> Self {
        Self {
            timer,
            delay,
            pending: HashMap::new(),
            next_generation: 0,
            on_expired: Arc::new(on_expired),
        }
    }

    /// The default delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` for `key` after the default delay.
    pub fn schedule(&mut self, key: K, action: A) {
        self.schedule_after(key, action, self.delay);
    }

    /// Schedule `action` for `key` after `delay`, replacing any pending action
    /// for the same key.
    pub fn schedule_after(&mut self, key: K, action: A, delay: Duration) {
        if let Some(previous) = self.pending.remove(&key) {
            previous.deadline.cancel();
        }

        self.next_generation += 1;
        let generation = self.next_generation;

        let on_expired = self.on_expired.clone();
        let expired_key = key.clone();
        let deadline = self.timer.arm(
            delay,
            Box::new(move || on_expired(expired_key, generation)),
        );

        self.pending.insert(
            key,
            Pending {
                generation,
                deadline,
                action,
            },
        );
    }

    /// Complete an expired deadline.
    ///
    /// Returns the action if `generation` is still the current one for `key`,
    /// removing the entry. Returns `None` for stale or cancelled deadlines.
    pub fn expire(&mut self, key: &K, generation: u64) -> Option<A> {
        match self.pending.get(key) {
            Some(entry) if entry.generation == generation => {
                self.pending.remove(key).map(|entry| entry.action)
            }
            _ => {
                trace!("Discarding stale debounce generation {generation}");
                None
            }
        }
    }

    /// Cancel the pending action for `key` without running it.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some(entry) => {
                entry.deadline.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending action without running any of them.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, entry) in self.pending.drain() {
            entry.deadline.cancel();
        }
        count
    }

    /// Number of pending actions.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Whether an action is pending for `key`.
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }
}

impl<K, A> DebounceScheduler<K, A>
where
    K: Eq + Hash + Clone + Send + 'static,
    A: FnOnce(),
{
    /// Complete an expired deadline and run its action if still current.
    pub fn fire(&mut self, key: &K, generation: u64) -> bool {
        match self.expire(key, generation) {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TokioTimer;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    type Fired = Arc<Mutex<Vec<(&'static str, Instant)>>>;
    type Action = Box<dyn FnOnce() + Send>;

    fn scheduler(
        delay: Duration,
    ) -> (
        DebounceScheduler<&'static str, Action>,
        mpsc::UnboundedReceiver<(&'static str, u64)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timer = Arc::new(TokioTimer::current().unwrap());
        let scheduler = DebounceScheduler::new(timer, delay, move |key, generation| {
            let _ = tx.send((key, generation));
        });
        (scheduler, rx)
    }

    fn record(fired: &Fired, key: &'static str) -> Action {
        let fired = fired.clone();
        Box::new(move || fired.lock().unwrap().push((key, Instant::now())))
    }

    /// Fire every expiry that arrives within `window`.
    async fn drain(
        scheduler: &mut DebounceScheduler<&'static str, Action>,
        rx: &mut mpsc::UnboundedReceiver<(&'static str, u64)>,
        window: Duration,
    ) {
        let until = Instant::now() + window;
        while let Ok(Some((key, generation))) = tokio::time::timeout_at(until, rx.recv()).await {
            scheduler.fire(&key, generation);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_signal_fires_once_after_delay() {
        let (mut scheduler, mut rx) = scheduler(Duration::from_millis(100));
        let fired: Fired = Arc::default();
        let start = Instant::now();

        scheduler.schedule("a.txt", record(&fired, "a.txt"));
        assert!(scheduler.is_pending(&"a.txt"));

        drain(&mut scheduler, &mut rx, Duration::from_millis(500)).await;

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        let elapsed = fired[0].1 - start;
        assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(105));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_trailing_edge() {
        let (mut scheduler, mut rx) = scheduler(Duration::from_millis(100));
        let fired: Fired = Arc::default();
        let start = Instant::now();

        for i in 0..5 {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            scheduler.schedule("f.txt", record(&fired, "f.txt"));
        }

        drain(&mut scheduler, &mut rx, Duration::from_millis(500)).await;

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        // Last signal at 80ms, fires 100ms later.
        let elapsed = fired[0].1 - start;
        assert!(elapsed >= Duration::from_millis(180) && elapsed < Duration::from_millis(185));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let (mut scheduler, mut rx) = scheduler(Duration::from_millis(100));
        let fired: Fired = Arc::default();

        scheduler.schedule("a", record(&fired, "a"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.schedule("b", record(&fired, "b"));
        assert_eq!(scheduler.pending(), 2);

        drain(&mut scheduler, &mut rx, Duration::from_millis(500)).await;

        let keys: Vec<_> = fired.lock().unwrap().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_is_discarded() {
        let (mut scheduler, _rx) = scheduler(Duration::from_millis(100));
        let fired: Fired = Arc::default();

        scheduler.schedule("a", record(&fired, "a"));
        scheduler.schedule("a", record(&fired, "a"));

        assert!(!scheduler.fire(&"a", 1));
        assert!(scheduler.is_pending(&"a"));
        assert!(scheduler.fire(&"a", 2));
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_fires_nothing() {
        let (mut scheduler, mut rx) = scheduler(Duration::from_millis(100));
        let fired: Fired = Arc::default();

        scheduler.schedule("a", record(&fired, "a"));
        scheduler.schedule("b", record(&fired, "b"));
        assert_eq!(scheduler.cancel_all(), 2);

        drain(&mut scheduler, &mut rx, Duration::from_millis(500)).await;
        assert!(fired.lock().unwrap().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_single_key() {
        let (mut scheduler, mut rx) = scheduler(Duration::from_millis(100));
        let fired: Fired = Arc::default();

        scheduler.schedule("a", record(&fired, "a"));
        scheduler.schedule("b", record(&fired, "b"));
        assert!(scheduler.cancel(&"a"));
        assert!(!scheduler.cancel(&"a"));

        drain(&mut scheduler, &mut rx, Duration::from_millis(500)).await;
        let keys: Vec<_> = fired.lock().unwrap().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["b"]);
    }
}
