use crate::cancel::CancelToken;
use crate::error::SyncError;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// The counter is kept outside the mutex and manipulated with CAS
// loops; the mutex exists only to pair with the condvar for waiters.
// `up` takes the mutex briefly before notifying so that a waiter that
// has observed a non-zero count cannot miss the wakeup between its
// check and its condvar wait.

struct LatchInner {
    count: AtomicUsize,
    lock: Mutex<()>,
    cond: Condvar,
}

/// Re-armable counting latch for fan-out/fan-in tracking
///
/// Counts outstanding units of work: [`CountingLatch::down`] registers
/// one, [`CountingLatch::up`] signals one complete, and the waiting
/// calls block until nothing is outstanding.  Unlike a one-shot
/// countdown latch, the counter may be raised again after reaching
/// zero, so a single latch can track a continuously varying set of
/// in-flight tasks ("wait until nothing is in flight right now").
///
/// The counter never goes below zero: an [`CountingLatch::up`] with
/// nothing outstanding is a defined no-op rather than an error, which
/// allows completion signals to be delivered unconditionally from
/// `Drop` handlers and the like.
///
/// Clones share the same latch.
///
/// [`CountingLatch::down`]: struct.CountingLatch.html#method.down
/// [`CountingLatch::up`]: struct.CountingLatch.html#method.up
pub struct CountingLatch {
    inner: Arc<LatchInner>,
}

impl CountingLatch {
    /// Create a new latch with a count of zero
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LatchInner {
                count: AtomicUsize::new(0),
                lock: Mutex::new(()),
                cond: Condvar::new(),
            }),
        }
    }

    /// Register one unit of outstanding work.  Never blocks, never
    /// fails.
    pub fn down(&self) {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Signal one unit of work complete.  Returns `false` if the
    /// counter was already zero, in which case nothing changes and no
    /// waiter is woken.  When this call takes the counter from one to
    /// zero, every thread blocked in a waiting call is released.
    pub fn up(&self) -> bool {
        let mut cur = self.inner.count.load(Ordering::SeqCst);
        loop {
            if cur == 0 {
                return false;
            }
            match self.inner.count.compare_exchange(
                cur,
                cur - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(now) => cur = now,
            }
        }
        if cur == 1 {
            // Serialize against waiters' check-then-wait
            drop(self.inner.lock.lock());
            self.inner.cond.notify_all();
        }
        true
    }

    /// Current counter value.  A snapshot; under concurrent `down`/`up`
    /// it may be stale by the time the caller looks at it.
    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Test whether nothing is outstanding, i.e. `count() == 0`
    pub fn is_up(&self) -> bool {
        self.count() == 0
    }

    /// Block the calling thread until the counter is zero.  Returns
    /// immediately if it already is.
    pub fn wait(&self) {
        let mut guard = self.inner.lock.lock();
        while self.inner.count.load(Ordering::SeqCst) != 0 {
            self.inner.cond.wait(&mut guard);
        }
    }

    /// Block until the counter is zero or the timeout elapses.
    /// Returns `true` if the counter reached zero in time, `false` on
    /// timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock();
        while self.inner.count.load(Ordering::SeqCst) != 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.inner.cond.wait_for(&mut guard, deadline - now);
        }
        true
    }

    /// Block until the counter is zero, or fail with
    /// [`SyncError::Cancelled`] if the token is cancelled first.
    ///
    /// [`SyncError::Cancelled`]: enum.SyncError.html#variant.Cancelled
    pub fn wait_cancellable(&self, token: &CancelToken) -> Result<(), SyncError> {
        let inner = self.inner.clone();
        let _hook = token.add_hook(Box::new(move || {
            drop(inner.lock.lock());
            inner.cond.notify_all();
        }));
        let mut guard = self.inner.lock.lock();
        loop {
            if self.inner.count.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }
            if let Some(err) = token.error() {
                return Err(err);
            }
            self.inner.cond.wait(&mut guard);
        }
    }

    /// Block until the counter is zero (`Ok(true)`), the timeout
    /// elapses (`Ok(false)`), or the token is cancelled
    /// ([`SyncError::Cancelled`]).
    ///
    /// [`SyncError::Cancelled`]: enum.SyncError.html#variant.Cancelled
    pub fn wait_timeout_cancellable(
        &self,
        token: &CancelToken,
        timeout: Duration,
    ) -> Result<bool, SyncError> {
        let deadline = Instant::now() + timeout;
        let inner = self.inner.clone();
        let _hook = token.add_hook(Box::new(move || {
            drop(inner.lock.lock());
            inner.cond.notify_all();
        }));
        let mut guard = self.inner.lock.lock();
        loop {
            if self.inner.count.load(Ordering::SeqCst) == 0 {
                return Ok(true);
            }
            if let Some(err) = token.error() {
                return Err(err);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            self.inner.cond.wait_for(&mut guard, deadline - now);
        }
    }
}

impl Default for CountingLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CountingLatch {
    /// Get another handle to the same latch
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl std::fmt::Debug for CountingLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingLatch")
            .field("count", &self.count())
            .finish()
    }
}
