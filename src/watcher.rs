//! Debounced filesystem watching for the base and personal trees
//!
//! Raw filesystem events are buffered through a quiet-window debounce
//! before a single rescan notification is emitted. Notifications flow
//! into a bounded capacity-1 channel, so triggers arriving while the
//! orchestrator is busy merge instead of stacking. The watcher never
//! mutates library state.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::Result;

/// Poll cadence of the debounce loop
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A rescan request emitted after a quiet window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescanRequested;

/// Pure debounce state machine.
///
/// Each recorded event restarts the quiet timer; once the window elapses
/// with no further events, one emission is due. Driven by explicit
/// instants so it can be tested with a synthetic event producer.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending_since: Option<Instant>,
}

impl Debouncer {
    /// Create a debouncer with the given quiet window
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            pending_since: None,
        }
    }

    /// Record a raw event, restarting the quiet timer
    pub fn record_event(&mut self, at: Instant) {
        self.pending_since = Some(at);
    }

    /// Whether events are buffered awaiting the quiet window
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// Check whether an emission is due at `now`; clears the buffer if so
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending_since {
            Some(since) if now.duration_since(since) >= self.window => {
                self.pending_since = None;
                true
            }
            _ => false,
        }
    }
}

/// Background watcher over the base and personal trees
pub struct LibraryWatcher {
    // Dropping the watcher closes the raw event channel, which ends the
    // debounce thread
    _watcher: RecommendedWatcher,
    handle: Option<JoinHandle<()>>,
}

impl LibraryWatcher {
    /// Watch both trees and emit debounced [`RescanRequested`]
    /// notifications into `notifications`.
    ///
    /// `notifications` should be created with capacity 1 via
    /// [`mpsc::sync_channel`]; a notification that cannot be enqueued is
    /// dropped because an equivalent one is already pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the native watcher cannot be initialized.
    pub fn spawn(
        base_root: &Path,
        personal_root: &Path,
        window: Duration,
        notifications: SyncSender<RescanRequested>,
    ) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<notify::Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |event| {
                let _ = raw_tx.send(event);
            },
            notify::Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        watcher
            .watch(base_root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch base tree: {}", base_root.display()))?;
        watcher
            .watch(personal_root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch personal tree: {}", personal_root.display()))?;

        let roots = vec![base_root.to_path_buf(), personal_root.to_path_buf()];
        let handle = thread::spawn(move || {
            Self::debounce_loop(&raw_rx, &roots, window, &notifications);
        });

        Ok(Self {
            _watcher: watcher,
            handle: Some(handle),
        })
    }

    fn debounce_loop(
        raw_rx: &mpsc::Receiver<notify::Result<notify::Event>>,
        roots: &[PathBuf],
        window: Duration,
        notifications: &SyncSender<RescanRequested>,
    ) {
        let mut debouncer = Debouncer::new(window);

        loop {
            match raw_rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(event)) => {
                    if event.paths.iter().any(|p| is_relevant(p, roots)) {
                        debouncer.record_event(Instant::now());
                    }
                }
                // Watcher errors degrade to a rescan rather than a stall
                Ok(Err(_)) => debouncer.record_event(Instant::now()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if debouncer.poll(Instant::now()) {
                match notifications.try_send(RescanRequested) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        }
    }

    /// Stop watching and join the debounce thread
    pub fn shutdown(self) {
        let Self { _watcher, handle } = self;
        // Dropping the watcher closes the raw channel, which ends the loop
        drop(_watcher);
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

/// Events on hidden paths (state directory, editor droppings) are noise
fn is_relevant(path: &Path, roots: &[PathBuf]) -> bool {
    for root in roots {
        if let Ok(rel) = path.strip_prefix(root) {
            return !rel
                .components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with('.'));
        }
    }
    false
}
