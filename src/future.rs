use crate::cancel::CancelToken;
use crate::error::{BoxError, Failure, SyncError};
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

enum State<T> {
    Pending,
    Succeeded(T),
    Failed(Arc<Failure>),
}

struct FutureInner<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
}

/// Blocking, write-once result cell
///
/// A rendezvous point between one producer thread and any number of
/// consumer threads.  The producer completes the cell exactly once,
/// either with a value or with a captured failure; consumers block in
/// [`SingleAssignmentFuture::value`] until that happens, or peek
/// without blocking.
///
/// Completion is strict single-assignment: the first
/// success-or-failure transition is the only one ever recorded.  Later
/// completion attempts are ignored and report `false`, so a
/// non-blocking peek always agrees with what every blocked waiter was
/// handed.
///
/// A failure raised inside [`SingleAssignmentFuture::compute`] is
/// never re-raised on the producer's thread; it is captured and only
/// surfaces to consumers calling the blocking getters.
///
/// Clones share the same cell.  For a pure completion signal with no
/// value, use [`VoidFuture`].
///
/// [`SingleAssignmentFuture::compute`]: struct.SingleAssignmentFuture.html#method.compute
/// [`SingleAssignmentFuture::value`]: struct.SingleAssignmentFuture.html#method.value
/// [`VoidFuture`]: type.VoidFuture.html
pub struct SingleAssignmentFuture<T> {
    inner: Arc<FutureInner<T>>,
}

/// Completion/rendezvous signal with no value
///
/// The void flavor of [`SingleAssignmentFuture`]: the producer calls
/// [`complete`] (or `fail`), consumers call [`wait`].  Used for things
/// like "the subprocess driving a pipe has finished".
///
/// [`SingleAssignmentFuture`]: struct.SingleAssignmentFuture.html
/// [`complete`]: struct.SingleAssignmentFuture.html#method.complete
/// [`wait`]: struct.SingleAssignmentFuture.html#method.wait
pub type VoidFuture = SingleAssignmentFuture<()>;

impl<T> SingleAssignmentFuture<T> {
    /// Create a new pending cell
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FutureInner {
                state: Mutex::new(State::Pending),
                cond: Condvar::new(),
            }),
        }
    }

    /// Run `action` synchronously on the calling thread, capturing its
    /// outcome as the cell's completion.  A returned error or a panic
    /// inside `action` is captured as a [`Failure`] rather than
    /// propagating on this thread.  Returns `true` if this call
    /// performed the completion, `false` if the cell was already
    /// complete (in which case the outcome of `action` is discarded).
    ///
    /// [`Failure`]: struct.Failure.html
    pub fn compute(&self, action: impl FnOnce() -> Result<T, BoxError>) -> bool {
        match catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(value)) => self.success(value),
            Ok(Err(err)) => self.fail(Failure::from_error(err)),
            Err(payload) => self.fail(Failure::from_panic(payload)),
        }
    }

    /// Complete the cell with a value.  Returns `false` (and changes
    /// nothing) if the cell was already complete.
    pub fn success(&self, value: T) -> bool {
        self.transition(State::Succeeded(value))
    }

    /// Complete the cell with a failure.  Returns `false` (and changes
    /// nothing) if the cell was already complete.
    pub fn fail(&self, failure: Failure) -> bool {
        self.transition(State::Failed(Arc::new(failure)))
    }

    /// Complete the cell with an error, wrapping it as a [`Failure`]
    ///
    /// [`Failure`]: struct.Failure.html
    pub fn fail_error(&self, err: BoxError) -> bool {
        self.fail(Failure::from_error(err))
    }

    fn transition(&self, next: State<T>) -> bool {
        {
            let mut state = self.inner.state.lock();
            if !matches!(*state, State::Pending) {
                return false;
            }
            *state = next;
        }
        self.inner.cond.notify_all();
        true
    }

    /// Test whether the cell has completed (either way)
    pub fn is_done(&self) -> bool {
        !matches!(*self.inner.state.lock(), State::Pending)
    }

    /// Block until the cell completes.  `Ok(())` on success,
    /// [`SyncError::ComputationFailed`] if the producer failed.  Does
    /// not touch the value, so no `Clone` bound; this is the whole
    /// consumer API of the void flavor.
    ///
    /// [`SyncError::ComputationFailed`]: enum.SyncError.html#variant.ComputationFailed
    pub fn wait(&self) -> Result<(), SyncError> {
        let mut state = self.inner.state.lock();
        loop {
            match &*state {
                State::Pending => {}
                State::Succeeded(_) => return Ok(()),
                State::Failed(f) => return Err(SyncError::ComputationFailed(f.clone())),
            }
            self.inner.cond.wait(&mut state);
        }
    }

    /// As [`SingleAssignmentFuture::wait`], but fails with
    /// [`SyncError::Cancelled`] if the token is cancelled first.
    /// Cancellation of a waiter is distinct from failure of the
    /// computation and does not disturb the cell.
    ///
    /// [`SingleAssignmentFuture::wait`]: struct.SingleAssignmentFuture.html#method.wait
    /// [`SyncError::Cancelled`]: enum.SyncError.html#variant.Cancelled
    pub fn wait_cancellable(&self, token: &CancelToken) -> Result<(), SyncError>
    where
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        let _hook = token.add_hook(Box::new(move || {
            drop(inner.state.lock());
            inner.cond.notify_all();
        }));
        let mut state = self.inner.state.lock();
        loop {
            match &*state {
                State::Pending => {}
                State::Succeeded(_) => return Ok(()),
                State::Failed(f) => return Err(SyncError::ComputationFailed(f.clone())),
            }
            if let Some(err) = token.error() {
                return Err(err);
            }
            self.inner.cond.wait(&mut state);
        }
    }
}

impl<T: Clone> SingleAssignmentFuture<T> {
    /// Block until the cell completes and return the value, or the
    /// failure the producer captured.  Any number of threads may call
    /// this; each receives a clone of the value or a shared handle to
    /// the same failure.
    pub fn value(&self) -> Result<T, SyncError> {
        let mut state = self.inner.state.lock();
        loop {
            match &*state {
                State::Pending => {}
                State::Succeeded(v) => return Ok(v.clone()),
                State::Failed(f) => return Err(SyncError::ComputationFailed(f.clone())),
            }
            self.inner.cond.wait(&mut state);
        }
    }

    /// As [`SingleAssignmentFuture::value`], but fails with
    /// [`SyncError::Cancelled`] if the token is cancelled first
    ///
    /// [`SingleAssignmentFuture::value`]: struct.SingleAssignmentFuture.html#method.value
    /// [`SyncError::Cancelled`]: enum.SyncError.html#variant.Cancelled
    pub fn value_cancellable(&self, token: &CancelToken) -> Result<T, SyncError>
    where
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        let _hook = token.add_hook(Box::new(move || {
            drop(inner.state.lock());
            inner.cond.notify_all();
        }));
        let mut state = self.inner.state.lock();
        loop {
            match &*state {
                State::Pending => {}
                State::Succeeded(v) => return Ok(v.clone()),
                State::Failed(f) => return Err(SyncError::ComputationFailed(f.clone())),
            }
            if let Some(err) = token.error() {
                return Err(err);
            }
            self.inner.cond.wait(&mut state);
        }
    }

    /// Non-blocking check: the value if the cell completed
    /// successfully, else `None`.  A failed cell also reports `None`;
    /// the failure itself only surfaces through the blocking getters.
    pub fn peek(&self) -> Option<T> {
        match &*self.inner.state.lock() {
            State::Succeeded(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl SingleAssignmentFuture<()> {
    /// Complete the signal.  Returns `false` if already complete.
    pub fn complete(&self) -> bool {
        self.success(())
    }
}

impl<T> Default for SingleAssignmentFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SingleAssignmentFuture<T> {
    /// Get another handle to the same cell
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for SingleAssignmentFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.inner.state.lock() {
            State::Pending => "pending",
            State::Succeeded(_) => "succeeded",
            State::Failed(_) => "failed",
        };
        f.debug_struct("SingleAssignmentFuture")
            .field("state", &state)
            .finish()
    }
}
