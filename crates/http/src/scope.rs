//! Guards continuations against running after their owner is gone.
//!
//! Every continuation of a client or server first tries to enter the owner's
//! [`ScopeGuard`]. Entry is shared and cheap; stopping is exclusive, so
//! [`ScopeGuard::stop`] waits for every continuation currently inside the
//! scope to leave, and after it returns no continuation can enter again.
//!
//! The lock returned by [`ScopeGuard::try_enter`] is not `Send`, which keeps it
//! from being held across an `.await` inside a spawned task.

use std::sync::{PoisonError, RwLock, RwLockReadGuard};

#[derive(Debug, Default)]
pub struct ScopeGuard {
    stopped: RwLock<bool>,
}

/// Proof that the owner is alive; the owner cannot finish stopping while one exists.
#[derive(Debug)]
#[must_use = "the scope is only held while the lock is alive"]
pub struct ScopeLock<'a> {
    _guard: RwLockReadGuard<'a, bool>,
}

impl ScopeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the scope, or returns `None` once [`stop`](Self::stop) has begun.
    pub fn try_enter(&self) -> Option<ScopeLock<'_>> {
        let guard = self.stopped.read().unwrap_or_else(PoisonError::into_inner);
        if *guard { None } else { Some(ScopeLock { _guard: guard }) }
    }

    /// Waits for every holder to leave, then refuses all further entries.
    pub fn stop(&self) {
        *self.stopped.write().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.read().unwrap_or_else(PoisonError::into_inner)
    }
}
