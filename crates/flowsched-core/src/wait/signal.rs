//! Per-worker wake signal used by the `Blocked` state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A level-triggered wake signal.
///
/// A notification that arrives while the worker is still scanning is kept
/// as a pending flag, so the next [`wait`](Self::wait) returns at once
/// instead of losing the wake-up.
#[derive(Debug, Default)]
pub struct WakeSignal {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl WakeSignal {
    /// Creates a signal with no pending notification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the signal pending and wakes the waiter, if any.
    pub fn notify(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.cond.notify_one();
    }

    /// Waits for a notification, for `stop` to be set, or for `timeout`.
    ///
    /// Returns `true` if a notification was consumed.
    ///
    /// Setters of `stop` must call [`notify`](Self::notify) afterwards; the
    /// flag is checked under the signal's lock so that sequence never races
    /// with the waiter going to sleep.
    pub fn wait(&self, stop: &AtomicBool, timeout: Duration) -> bool {
        let mut pending = self.pending.lock();
        if !*pending && !stop.load(Ordering::Acquire) {
            let _ = self.cond.wait_for(&mut pending, timeout);
        }
        std::mem::replace(&mut *pending, false)
    }

    /// Returns true if a notification is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        *self.pending.lock()
    }
}
