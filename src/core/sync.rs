//! Run permit and interruptible pause used by the scheduler.
//!
//! Both are a `parking_lot::Mutex` paired with a `Condvar`: waiters block without
//! polling and are released by explicit notification.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Single-slot permit enforcing that at most one drain cycle is in flight.
#[derive(Debug, Default)]
pub struct RunPermit {
    held: Mutex<bool>,
    released: Condvar,
}

impl RunPermit {
    /// Create a free permit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the permit if it is free.
    pub fn try_acquire(&self) -> bool {
        let mut held = self.held.lock();
        if *held {
            false
        } else {
            *held = true;
            true
        }
    }

    /// Take the permit, waiting up to `timeout` for the current holder to release it.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let mut held = self.held.lock();
        let result = self.released.wait_while_for(&mut held, |held| *held, timeout);
        if result.timed_out() && *held {
            return false;
        }
        *held = true;
        true
    }

    /// Release the permit and wake anyone waiting for it.
    pub fn release(&self) {
        *self.held.lock() = false;
        self.released.notify_all();
    }

    /// True while a holder has the permit.
    #[must_use]
    pub fn is_held(&self) -> bool {
        *self.held.lock()
    }

    /// Take the permit if free, returning a guard that releases it on drop.
    #[must_use]
    pub fn try_guard(permit: &Arc<Self>) -> Option<PermitGuard> {
        permit.try_acquire().then(|| PermitGuard {
            permit: Arc::clone(permit),
        })
    }
}

/// Releases its [`RunPermit`] when dropped, including when a queued cycle is discarded.
#[derive(Debug)]
pub struct PermitGuard {
    permit: Arc<RunPermit>,
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        self.permit.release();
    }
}

/// How a pause ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    /// The full interval elapsed.
    Elapsed,
    /// A wake signal cut the pause short.
    Woken,
    /// Shutdown was signalled.
    Shutdown,
}

#[derive(Debug, Default)]
struct PauseState {
    pending: bool,
    pausing: bool,
    shutdown: bool,
}

/// Wait primitive holding at most one pending wake signal.
///
/// A wake that arrives while nobody is pausing is remembered and ends the next pause
/// immediately; further wakes before then coalesce into the same signal.
#[derive(Debug, Default)]
pub struct PauseSignal {
    state: Mutex<PauseState>,
    changed: Condvar,
}

impl PauseSignal {
    /// Create a signal with no pending wake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block for up to `interval`, consuming any pending wake signal.
    pub fn pause(&self, interval: Duration) -> PauseOutcome {
        let mut state = self.state.lock();
        state.pausing = true;
        self.changed
            .wait_while_for(&mut state, |s| !s.pending && !s.shutdown, interval);
        state.pausing = false;
        let woken = std::mem::take(&mut state.pending);
        if state.shutdown {
            PauseOutcome::Shutdown
        } else if woken {
            PauseOutcome::Woken
        } else {
            PauseOutcome::Elapsed
        }
    }

    /// Leave a wake signal, ending the current or next pause.
    pub fn wake(&self) {
        self.state.lock().pending = true;
        self.changed.notify_all();
    }

    /// Wake only if a pause is in progress. Returns whether one was.
    pub fn wake_if_pausing(&self) -> bool {
        let mut state = self.state.lock();
        if !state.pausing {
            return false;
        }
        state.pending = true;
        drop(state);
        self.changed.notify_all();
        true
    }

    /// Discard any pending wake signal.
    pub fn clear(&self) {
        self.state.lock().pending = false;
    }

    /// True while a pause is in progress.
    #[must_use]
    pub fn is_pausing(&self) -> bool {
        self.state.lock().pausing
    }

    /// End the current pause and make every later pause return immediately.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.changed.notify_all();
    }
}
