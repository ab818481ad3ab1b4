//! Tree watcher: the coordinator and its public entry points.
//!
//! All mutable watch state (registered directories, pending debounces,
//! pending retries) is owned by one [`Dispatcher`]. Raw notifications from the
//! backend, expired deadlines and the shutdown request are all funneled
//! through a single channel into the dispatcher, which runs on its own thread
//! with a current-thread tokio runtime.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, ThreadId};

use notify::EventKind;
use notify::event::{AccessKind, AccessMode};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::{NotifyBackend, WatchBackend};
use crate::config::WatchConfig;
use crate::debounce::DebounceScheduler;
use crate::error::{Result, WatcherError};
use crate::handler::{ChangeHandler, DeliveryGate};
use crate::recovery::RecoveryLoop;
use crate::registry::WatchRegistry;
use crate::timer::{Timer, TokioTimer};

/// Work item for the dispatcher.
#[derive(Debug)]
pub(crate) enum Message {
    /// Raw notification or error from the backend.
    Fs(notify::Result<notify::Event>),

    /// A debounce deadline expired.
    Flush { path: PathBuf, generation: u64 },

    /// A recovery backoff expired.
    Retry { path: PathBuf, generation: u64 },

    /// Tear everything down and exit.
    Shutdown,
}

/// Single owner of a tree watch's state.
pub(crate) struct Dispatcher<B: WatchBackend> {
    root: PathBuf,
    registry: WatchRegistry<B>,
    debouncer: DebounceScheduler<PathBuf, ()>,
    recovery: RecoveryLoop,
    handler: Box<dyn ChangeHandler>,
    gate: DeliveryGate,
}

impl<B: WatchBackend> Dispatcher<B> {
    pub(crate) fn new(
        root: PathBuf,
        config: &WatchConfig,
        backend: B,
        timer: Arc<dyn Timer>,
        tx: mpsc::UnboundedSender<Message>,
        handler: Box<dyn ChangeHandler>,
        gate: DeliveryGate,
    ) -> Self {
        let flush_tx = tx.clone();
        let debouncer = DebounceScheduler::new(timer.clone(), config.debounce(), move |path, generation| {
            let _ = flush_tx.send(Message::Flush { path, generation });
        });
        let recovery = RecoveryLoop::new(timer, config.retry_backoff(), move |path, generation| {
            let _ = tx.send(Message::Retry { path, generation });
        });

        Self {
            root,
            registry: WatchRegistry::new(backend, config.filter()),
            debouncer,
            recovery,
            handler,
            gate,
        }
    }

    /// Register the initial watch-set.
    ///
    /// Only an invalid root is an error. If the root exists but cannot be
    /// watched, it is handed to the recovery loop.
    pub(crate) fn start(&mut self) -> Result<usize> {
        match self.registry.register_subtree(&self.root) {
            Ok(count) => Ok(count),
            Err(e) if e.is_invalid_root() => Err(e),
            Err(e) => {
                warn!("Failed to watch {}: {e}", self.root.display());
                self.recovery.on_watch_error(&mut self.registry, &self.root);
                Ok(0)
            }
        }
    }

    /// Process messages until shutdown, then release everything.
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = rx.recv().await {
            if !self.handle(message) {
                break;
            }
        }
        self.shutdown();
    }

    /// Handle one message. Returns `false` on shutdown.
    fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::Fs(Ok(event)) => self.handle_event(event),
            Message::Fs(Err(e)) => self.handle_error(e),
            Message::Flush { path, generation } => self.flush(path, generation),
            Message::Retry { path, generation } => {
                self.recovery.retry(&mut self.registry, &path, generation);
            }
            Message::Shutdown => return false,
        }
        true
    }

    fn handle_event(&mut self, event: notify::Event) {
        if event.need_rescan() {
            warn!("Events may have been lost; rescanning {}", self.root.display());
            self.rescan();
        }

        if !is_change(event.kind) {
            return;
        }

        for path in event.paths {
            self.handle_path(path);
        }
    }

    fn handle_path(&mut self, path: PathBuf) {
        // A watched directory replaced by a symlink counts as vanished.
        if self.registry.contains(&path) && !is_directory(&path) {
            self.forget_vanished(&path);
        }

        if path.file_name().is_none() || !self.registry.watches_parent_of(&path) {
            return;
        }
        if self.registry.filter().should_ignore(&path) {
            return;
        }

        self.debouncer.schedule(path.clone(), ());

        // Not followed through symlinks: a link to a directory is reported
        // but never watched.
        if is_directory(&path) {
            match self.registry.register_tree(&path, false) {
                Ok(0) => {}
                Ok(count) => debug!("Now watching {count} new directories under {}", path.display()),
                Err(e) => debug!("Failed to watch new directory {}: {e}", path.display()),
            }
        }
    }

    /// Drop the entries of a watched directory that no longer exists and of
    /// everything watched beneath it.
    ///
    /// A directory moved out of the tree takes its children with it without a
    /// per-directory event, and their watches follow the moved inodes. Below
    /// the root the parent's watch rediscovers the directory if it is
    /// recreated. Nothing watches the root's parent, so a vanished root goes
    /// through recovery instead.
    fn forget_vanished(&mut self, path: &Path) {
        if path == self.root {
            warn!("Watched root {} vanished", path.display());
            self.recovery.on_watch_error(&mut self.registry, path);
        } else {
            let released = self.registry.deregister_subtree(path);
            debug!("Released {released} watches under vanished {}", path.display());
        }
    }

    fn handle_error(&mut self, error: notify::Error) {
        if error.paths.is_empty() {
            warn!("Watch error: {error}");
            return;
        }

        for path in &error.paths {
            if self.registry.contains(path) {
                warn!("Watch on {} failed: {error}", path.display());
                self.recovery.on_watch_error(&mut self.registry, path);
            } else {
                debug!("Ignoring error for unwatched path {}: {error}", path.display());
            }
        }
    }

    fn rescan(&mut self) {
        if let Err(e) = self.registry.register_tree(&self.root, true) {
            warn!("Rescan of {} failed: {e}", self.root.display());
            self.recovery.on_watch_error(&mut self.registry, &self.root);
        }
    }

    fn flush(&mut self, path: PathBuf, generation: u64) {
        if self.debouncer.expire(&path, generation).is_some() {
            self.gate.deliver(self.handler.as_ref(), &path);
        }
    }

    fn shutdown(&mut self) {
        let dropped = self.debouncer.cancel_all();
        self.recovery.cancel_all();
        let released = self.registry.teardown_all();
        info!(
            "Stopped watching {} (released {released} watches, dropped {dropped} pending changes)",
            self.root.display()
        );
    }
}

/// Whether an event kind describes a change rather than a read.
fn is_change(kind: EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        _ => true,
    }
}

/// Whether `path` is a directory, without following a final symlink.
fn is_directory(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.is_dir())
}

/// Handle to a running tree watch.
///
/// Dropping the handle stops the watch.
pub struct WatchHandle {
    root: PathBuf,
    tx: mpsc::UnboundedSender<Message>,
    gate: DeliveryGate,
    stopped: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    dispatcher_id: ThreadId,
}

impl WatchHandle {
    /// The canonical root being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether [`WatchHandle::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop the watch.
    ///
    /// Once this returns the change handler is not running and will not be
    /// called again. Called from outside the handler, it also waits until
    /// every watch is released. Safe to call more than once.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.gate.close();
        let _ = self.tx.send(Message::Shutdown);

        // Stopping from inside the handler: the dispatcher finishes the
        // shutdown once the handler returns.
        if std::thread::current().id() == self.dispatcher_id {
            return;
        }

        if let Some(dispatcher) = self.dispatcher.lock().take() {
            if dispatcher.join().is_err() {
                warn!("Dispatcher for {} panicked", self.root.display());
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("root", &self.root)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Watch `root` recursively with the default configuration.
///
/// See [`watch_directory_with_config`].
pub fn watch_directory(
    root: impl AsRef<Path>,
    on_change: impl ChangeHandler,
) -> Result<WatchHandle> {
    watch_directory_with_config(root, WatchConfig::default(), on_change)
}

/// Watch `root` recursively, calling `on_change` once per debounced change.
///
/// Fails with [`WatcherError::InvalidRoot`] if `root` does not exist, before
/// any watch is created. Every other failure after setup is absorbed: broken
/// watches are retried, unreadable entries are skipped.
pub fn watch_directory_with_config(
    root: impl AsRef<Path>,
    config: WatchConfig,
    on_change: impl ChangeHandler,
) -> Result<WatchHandle> {
    let requested = root.as_ref();
    if !requested.exists() {
        return Err(WatcherError::InvalidRoot(requested.to_path_buf()));
    }
    let root = dunce::canonicalize(requested)
        .map_err(|_| WatcherError::InvalidRoot(requested.to_path_buf()))?;
    if !root.is_dir() {
        return Err(WatcherError::NotADirectory(root));
    }
    config.validate()?;

    if config.filter().should_ignore(&root) {
        warn!(
            "{} matches an ignore pattern; no changes will be reported",
            root.display()
        );
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let (tx, rx) = mpsc::unbounded_channel();
    let event_tx = tx.clone();
    let backend = NotifyBackend::new(move |res| {
        let _ = event_tx.send(Message::Fs(res));
    })?;

    let timer = Arc::new(TokioTimer::new(runtime.handle().clone()));
    let gate = DeliveryGate::new();
    let mut dispatcher = Dispatcher::new(
        root.clone(),
        &config,
        backend,
        timer,
        tx.clone(),
        Box::new(on_change),
        gate.clone(),
    );

    let count = dispatcher.start()?;
    info!("Watching {} ({count} directories)", root.display());

    let thread = std::thread::Builder::new()
        .name("treewatch-dispatcher".to_string())
        .spawn(move || runtime.block_on(dispatcher.run(rx)))?;
    let dispatcher_id = thread.thread().id();

    Ok(WatchHandle {
        root,
        tx,
        gate,
        stopped: AtomicBool::new(false),
        dispatcher: Mutex::new(Some(thread)),
        dispatcher_id,
    })
}
