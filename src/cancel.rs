use crate::error::SyncError;
use parking_lot::Mutex;
use slab::Slab;
use std::sync::Arc;

// Rust threads cannot be interrupted from outside, so cancellation of
// a blocked wait is an explicit signal instead.  A token carries a set
// of wake hooks, one per wait currently blocked against it.  Each hook
// briefly takes the waiting object's own mutex and notifies its
// condvar; taking that mutex is what closes the race against a waiter
// that has checked the token but not yet entered its condvar wait.
//
// Hooks run after the token's own lock has been released, so a hook
// acquiring a component mutex can never invert against a waiter that
// checks the token while holding that same component mutex.

struct TokenInner {
    state: Mutex<TokenState>,
}

struct TokenState {
    cancelled: Option<Arc<str>>,
    hooks: Slab<Box<dyn Fn() + Send>>,
}

/// Cancellation signal for blocked waits
///
/// A [`CancelToken`] stands in for the thread-interruption facility of
/// other platforms: it is created by whoever coordinates the waiting
/// thread, passed (by clone) to any party that may need to abort the
/// wait, and checked by the `*_cancellable` waiting calls on
/// [`CountingLatch`] and [`SingleAssignmentFuture`].  Once cancelled,
/// every wait blocked against the token wakes and fails with
/// [`SyncError::Cancelled`] carrying the reason, and any later wait
/// against the same token fails immediately.  A token cannot be
/// re-armed.
///
/// [`CancelToken`]: struct.CancelToken.html
/// [`CountingLatch`]: struct.CountingLatch.html
/// [`SingleAssignmentFuture`]: struct.SingleAssignmentFuture.html
/// [`SyncError::Cancelled`]: enum.SyncError.html#variant.Cancelled
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Create a new token in the not-cancelled state
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                state: Mutex::new(TokenState {
                    cancelled: None,
                    hooks: Slab::new(),
                }),
            }),
        }
    }

    /// Cancel with a generic reason.  Equivalent to
    /// `cancel_with("cancelled")`.
    pub fn cancel(&self) {
        self.cancel_with("cancelled");
    }

    /// Cancel, waking every wait currently blocked against this token.
    /// The reason is carried to each waiter inside
    /// [`SyncError::Cancelled`].  A second cancellation is a no-op;
    /// the first reason sticks.
    ///
    /// [`SyncError::Cancelled`]: enum.SyncError.html#variant.Cancelled
    pub fn cancel_with(&self, reason: impl Into<Arc<str>>) {
        let hooks;
        {
            let mut state = self.inner.state.lock();
            if state.cancelled.is_some() {
                return;
            }
            state.cancelled = Some(reason.into());
            hooks = std::mem::replace(&mut state.hooks, Slab::new());
        }
        // Token lock released; hooks may take component locks freely
        for (_, hook) in hooks.iter() {
            hook();
        }
    }

    /// Test whether the token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancelled.is_some()
    }

    /// The error to fail a waiter with, if cancelled
    pub(crate) fn error(&self) -> Option<SyncError> {
        self.inner
            .state
            .lock()
            .cancelled
            .clone()
            .map(SyncError::Cancelled)
    }

    /// Register a wake hook for the duration of one blocked wait.  The
    /// hook fires at most once, when the token is cancelled.  If the
    /// token is already cancelled the hook is never called; the waiter
    /// must check [`CancelToken::error`] before blocking, and again
    /// after every wakeup.
    ///
    /// [`CancelToken::error`]: struct.CancelToken.html#method.error
    pub(crate) fn add_hook(&self, hook: Box<dyn Fn() + Send>) -> HookGuard {
        let key = {
            let mut state = self.inner.state.lock();
            if state.cancelled.is_some() {
                None
            } else {
                Some(state.hooks.insert(hook))
            }
        };
        HookGuard {
            inner: self.inner.clone(),
            key,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CancelToken {
    /// Get another handle to the same token
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Removes the wake hook when the blocked wait ends
pub(crate) struct HookGuard {
    inner: Arc<TokenInner>,
    key: Option<usize>,
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key {
            let mut state = self.inner.state.lock();
            // Already drained if the token was cancelled meanwhile
            if state.hooks.contains(key) {
                state.hooks.remove(key);
            }
        }
    }
}
