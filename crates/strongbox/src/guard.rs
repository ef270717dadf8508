//! Scoped cleanup guards
//!
//! A [`CleanupGuard`] registers its action before the resource it protects
//! is acquired. The action runs exactly once: when the guard is dropped
//! (normal return, `?` propagation, panic unwind) or, if the process is
//! interrupted first, from the signal handler installed by
//! [`install_signal_handler`].

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use tracing::debug;

/// Exit status used when an interrupt tears the process down
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

type Action = Box<dyn FnOnce() + Send>;

struct Pending {
    action: Action,
    #[cfg(test)]
    thread: std::thread::ThreadId,
}

/// Pending cleanup actions keyed by registration order
struct Registry {
    actions: Mutex<BTreeMap<u64, Pending>>,
    next_id: AtomicU64,
}

impl Registry {
    const fn new() -> Self {
        Self {
            actions: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Pending>> {
        // A panicking action must not disable every later cleanup
        self.actions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, action: Action) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let pending = Pending {
            action,
            #[cfg(test)]
            thread: std::thread::current().id(),
        };
        self.lock().insert(id, pending);
        id
    }

    fn take(&self, id: u64) -> Option<Action> {
        self.lock().remove(&id).map(|pending| pending.action)
    }

    /// Run every pending action, newest first
    fn run_all(&self) -> usize {
        let pending = std::mem::take(&mut *self.lock());
        let count = pending.len();
        for (_, entry) in pending.into_iter().rev() {
            (entry.action)();
        }
        count
    }

    /// Run the actions registered by the calling thread, newest first
    #[cfg(test)]
    fn run_current_thread(&self) -> usize {
        let current = std::thread::current().id();
        let ids: Vec<u64> = self
            .lock()
            .iter()
            .filter(|(_, pending)| pending.thread == current)
            .map(|(&id, _)| id)
            .collect();
        for &id in ids.iter().rev() {
            if let Some(action) = self.take(id) {
                action();
            }
        }
        ids.len()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }
}

static REGISTRY: Registry = Registry::new();
static SIGNAL_HANDLER: Once = Once::new();

/// Runs its cleanup action when dropped or when the process is interrupted
#[derive(Debug)]
#[must_use = "the cleanup action runs as soon as the guard is dropped"]
pub struct CleanupGuard {
    id: u64,
}

impl CleanupGuard {
    /// Register `action`; it runs when the returned guard goes away
    pub fn register<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id: REGISTRY.insert(Box::new(action)),
        }
    }

    /// Forget the action without running it
    pub fn disarm(self) {
        REGISTRY.take(self.id);
        std::mem::forget(self);
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(action) = REGISTRY.take(self.id) {
            action();
        }
    }
}

/// Install the SIGINT/SIGTERM/SIGHUP handler (idempotent)
///
/// On a signal every pending action runs, then the process exits with
/// [`INTERRUPTED_EXIT_CODE`].
pub fn install_signal_handler() -> Result<()> {
    let mut result = Ok(());
    SIGNAL_HANDLER.call_once(|| {
        result = ctrlc::set_handler(|| {
            let count = REGISTRY.run_all();
            debug!(count, "interrupted, ran pending cleanup");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        })
        .context("failed to install signal handler");
    });
    result
}

/// Run the calling thread's pending actions as an interrupt would, without
/// exiting
#[cfg(test)]
pub(crate) fn interrupt_current_thread() -> usize {
    REGISTRY.run_current_thread()
}
