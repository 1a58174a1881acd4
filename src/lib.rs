//! **Threadlink** is a small toolkit of blocking, in-process
//! concurrency primitives for coordinating asynchronous work between
//! native threads, without any async runtime.  All scheduling is
//! genuinely multi-threaded and preemptive; blocking calls park the
//! calling OS thread on a mutex + condition-variable pair, they never
//! spin (apart from the short periodic re-check a blocked pipe call
//! uses to notice a dead peer).
//!
//! The four components are independent leaves: none depends on any
//! other, none shares a lock with any other, and callers may use any
//! subset.
//!
//! - [Overview of types](#overview-of-types)
//! - [Cancellation](#cancellation)
//! - [Errors](#errors)
//! - [Cargo features](#cargo-features)
//!
//! # Overview of types
//!
//! [`CountingLatch`] is a re-armable fan-out/fan-in barrier: count
//! work items in with [`CountingLatch::down`], signal them complete
//! with [`CountingLatch::up`], and wait (optionally with a timeout)
//! for the count to reach zero.  Because the counter can be raised
//! again after reaching zero, one latch can track a continuously
//! varying set of in-flight tasks.
//!
//! [`SingleAssignmentFuture`] is a blocking, write-once result cell: a
//! producer thread completes it exactly once with a value or a
//! captured failure, and any number of consumer threads block on
//! [`SingleAssignmentFuture::value`] or peek without blocking.
//! [`VoidFuture`] is the value-less flavor, a pure completion signal.
//!
//! [`EagerGrowthThreadPool`] is a worker pool whose admission policy
//! prefers spawning workers over queuing tasks, up to a configured
//! maximum; only at the maximum does the queue absorb backpressure.
//! Bursty, short-duration blocking work gets a worker quickly instead
//! of queuing behind a small core pool.
//!
//! [`BoundedBytePipe`] is a single-writer/single-reader byte stream
//! over a fixed circular buffer, with blocking reads and writes,
//! half-close semantics and dead-peer detection; [`bounded`] creates a
//! connected [`PipeWriter`]/[`PipeReader`] pair.
//!
//! A typical composition: a unit of work is submitted to the pool, a
//! latch tracks when the whole batch has finished, a single result
//! comes back through a future, and a subprocess's output is relayed
//! to its consumer thread through a pipe.
//!
//! ```
//! use threadlink::{CountingLatch, EagerGrowthThreadPool, SingleAssignmentFuture};
//!
//! let pool = EagerGrowthThreadPool::new(1, 4);
//! let latch = CountingLatch::new();
//! let result = SingleAssignmentFuture::new();
//!
//! latch.down();
//! let (l, r) = (latch.clone(), result.clone());
//! pool.execute(move || {
//!     r.compute(|| Ok(6 * 7));
//!     l.up();
//! }).unwrap();
//!
//! latch.wait();
//! assert_eq!(result.value().unwrap(), 42);
//! pool.shutdown();
//! ```
//!
//! # Cancellation
//!
//! Rust threads cannot be interrupted from outside, so a waiting
//! thread's cancellation is an explicit signal: the `*_cancellable`
//! waiting calls take a [`CancelToken`], and cancelling the token
//! wakes them with [`SyncError::Cancelled`] carrying the reason.  That
//! failure is distinct from a timeout (timed waits return `false`) and
//! from a failed computation ([`SyncError::ComputationFailed`]), so a
//! caller can always tell the three apart.
//!
//! # Errors
//!
//! Every failure any primitive can surface is a [`SyncError`].  The
//! primitives recover locally from transient conditions (a briefly
//! full buffer, a momentarily busy pool) and only report conditions
//! with no further local recovery: cancellation, terminal closure,
//! permanent rejection, a confirmed-dead peer.  Nothing is logged or
//! swallowed internally; every failure is returned to the caller, and
//! the deliberate no-ops (such as [`CountingLatch::up`] at zero) are
//! documented as such.
//!
//! # Cargo features
//!
//! - **logger**: enable lifecycle events (pool worker spawn/retire,
//! pipe close) via the `log` crate.  Off by default; failures are
//! never logged even with this enabled.
//!
//! [`BoundedBytePipe`]: struct.BoundedBytePipe.html
//! [`CancelToken`]: struct.CancelToken.html
//! [`CountingLatch::down`]: struct.CountingLatch.html#method.down
//! [`CountingLatch::up`]: struct.CountingLatch.html#method.up
//! [`CountingLatch`]: struct.CountingLatch.html
//! [`EagerGrowthThreadPool`]: struct.EagerGrowthThreadPool.html
//! [`PipeReader`]: struct.PipeReader.html
//! [`PipeWriter`]: struct.PipeWriter.html
//! [`SingleAssignmentFuture::value`]: struct.SingleAssignmentFuture.html#method.value
//! [`SingleAssignmentFuture`]: struct.SingleAssignmentFuture.html
//! [`SyncError::Cancelled`]: enum.SyncError.html#variant.Cancelled
//! [`SyncError::ComputationFailed`]: enum.SyncError.html#variant.ComputationFailed
//! [`SyncError`]: enum.SyncError.html
//! [`VoidFuture`]: type.VoidFuture.html
//! [`bounded`]: fn.bounded.html

// Insist on 2018 style
#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

// Lifecycle events only; never failures.  Compiles to nothing without
// the "logger" feature.
#[cfg(feature = "logger")]
macro_rules! lifecycle_log {
    ($($arg:tt)*) => { log::debug!(target: "threadlink", $($arg)*) };
}
#[cfg(not(feature = "logger"))]
macro_rules! lifecycle_log {
    ($($arg:tt)*) => {{}};
}

pub use cancel::CancelToken;
pub use error::{BoxError, Failure, RejectReason, SyncError};
pub use future::{SingleAssignmentFuture, VoidFuture};
pub use latch::CountingLatch;
pub use pipe::{bounded, BoundedBytePipe, PipeReader, PipeWriter, DEFAULT_CAPACITY};
pub use pool::{EagerGrowthThreadPool, PoolConfig};

// Static assertions
static_assertions::assert_impl_all!(CountingLatch: Send, Sync, Clone);
static_assertions::assert_impl_all!(CancelToken: Send, Sync, Clone);
static_assertions::assert_impl_all!(SingleAssignmentFuture<u8>: Send, Sync, Clone);
static_assertions::assert_impl_all!(VoidFuture: Send, Sync, Clone);
static_assertions::assert_impl_all!(EagerGrowthThreadPool: Send, Sync, Clone);
static_assertions::assert_impl_all!(BoundedBytePipe: Send, Sync);
static_assertions::assert_impl_all!(PipeWriter: Send);
static_assertions::assert_impl_all!(PipeReader: Send);
static_assertions::assert_impl_all!(SyncError: Send, Sync, Clone);
static_assertions::assert_not_impl_any!(PipeWriter: Clone);
static_assertions::assert_not_impl_any!(PipeReader: Clone);

mod cancel;
mod error;
mod future;
mod latch;
mod pipe;
mod pool;

#[cfg(test)]
mod test;
