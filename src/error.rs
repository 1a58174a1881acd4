use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error type accepted from producer code
///
/// Anything that a guarded computation can fail with is carried across
/// threads in this form.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Captured failure of a guarded computation
///
/// Holds the failure message and, where one was available, the
/// original error as `source()`.  A [`Failure`] is created on the
/// producer thread and delivered (shared through an `Arc`) to every
/// consumer blocked on the result, so the producer thread itself never
/// sees the error re-raised.
///
/// [`Failure`]: struct.Failure.html
#[derive(Debug, Error)]
#[error("{message}")]
pub struct Failure {
    message: String,
    #[source]
    cause: Option<BoxError>,
}

impl Failure {
    /// Create a failure from a plain message, with no underlying cause
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Create a failure wrapping an underlying error.  The failure's
    /// message is taken from the error's `Display` output, and the
    /// error itself remains available through `source()`.
    pub fn from_error(cause: BoxError) -> Self {
        Self {
            message: cause.to_string(),
            cause: Some(cause),
        }
    }

    /// Create a failure from a panic payload.  Passes through the
    /// panic message if it is a `String` or `&str`, else generates
    /// some debugging output.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(v) => *v,
            Err(payload) => match payload.downcast::<&str>() {
                Ok(v) => v.to_string(),
                Err(payload) => format!("Panic with unknown type: {:?}", payload.type_id()),
            },
        };
        Self {
            message,
            cause: None,
        }
    }

    /// The failure message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying error, if the failure wraps one
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

/// Why a thread pool refused a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The pool has been shut down
    ShutDown,
    /// The pool is at maximum size, the queue is full, and the
    /// zero-wait retry also failed
    Saturated,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShutDown => write!(f, "pool is shut down"),
            Self::Saturated => write!(f, "pool and queue are at capacity"),
        }
    }
}

/// Failure conditions reported by the primitives in this crate
///
/// Every failure a primitive can surface falls into one of these
/// kinds.  Transient conditions (a briefly full pipe buffer, a
/// momentarily saturated pool) are recovered locally and never appear
/// here; only conditions with no further local recovery do.  The enum
/// is `Clone` so that a single captured failure can be handed to any
/// number of blocked waiters.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The waiting call was cancelled through a [`CancelToken`];
    /// carries the cancellation reason.  Distinct from a timeout
    /// (timed waits return `false`) and from a failed computation.
    ///
    /// [`CancelToken`]: struct.CancelToken.html
    #[error("cancelled while waiting: {0}")]
    Cancelled(Arc<str>),

    /// The guarded computation behind a future failed; the captured
    /// cause is shared between all waiters
    #[error("computation failed: {0}")]
    ComputationFailed(Arc<Failure>),

    /// The thread pool could not accept the task
    #[error("task rejected: {0}")]
    Rejected(RejectReason),

    /// The thread on the other end of the pipe is gone without having
    /// closed its endpoint
    #[error("pipe peer thread is gone")]
    BrokenPipe,

    /// The pipe endpoint (either side) has already been closed
    #[error("pipe is closed")]
    ClosedPipe,

    /// The pipe endpoint has already been handed out
    #[error("pipe end is already connected")]
    AlreadyConnected,
}

impl SyncError {
    /// The captured computation failure, if that is what this error is
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::ComputationFailed(f) => Some(f),
            _ => None,
        }
    }
}
