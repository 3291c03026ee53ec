//! The wait-signal primitive used by the data store (C4) and subscription
//! engine (C6): a single-shot Pending -> Ready flag that async readers can
//! park on without blocking an OS thread (spec.md §4.4, §4.6). Unlike the
//! teacher's `watch::Queue` (built on a generic re-publishable `State<T>`)
//! this only ever fires once, so it is built directly on `tokio::sync::Notify`
//! plus an atomic flag rather than a general watch channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

struct Inner {
    ready: AtomicBool,
    notify: Notify,
}

/// A flag that starts unset and is released exactly once. Cloning shares
/// the same underlying flag; any clone can `release` it and any clone can
/// `acquire` (wait for) it.
#[derive(Clone)]
pub struct WaitSignal {
    inner: Arc<Inner>,
}

impl WaitSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                ready: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Flips the flag and wakes every current waiter. Idempotent.
    pub fn release(&self) {
        self.inner.ready.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Cooperatively parks until `release` has been called (or already had
    /// been). Never OS-blocks; the executor is free to poll other work
    /// while this future is pending.
    pub async fn acquire(&self) {
        loop {
            if self.is_ready() {
                return;
            }
            // Register interest before the re-check so a release landing
            // between the check above and this line still wakes us.
            let notified = self.inner.notify.notified();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for WaitSignal {
    fn default() -> Self {
        Self::new()
    }
}
