use crate::error::{RejectReason, SyncError};
use parking_lot::{Condvar, Mutex, MutexGuard};
use slab::Slab;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Sizing of an [`EagerGrowthThreadPool`]
///
/// [`EagerGrowthThreadPool`]: struct.EagerGrowthThreadPool.html
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Workers kept alive even when idle
    pub core_size: usize,
    /// Hard ceiling on live workers
    pub max_size: usize,
    /// How long a worker beyond `core_size` lingers idle before
    /// retiring
    pub keep_alive: Duration,
    /// Task queue capacity; the queue only absorbs backpressure once
    /// the pool is at `max_size`
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_size: 2,
            max_size: 8,
            keep_alive: Duration::from_secs(5),
            queue_capacity: 64,
        }
    }
}

struct Worker {
    // Task handed directly to a freshly spawned worker, taken by the
    // worker as its first item of work
    handoff: Option<Task>,
}

struct PoolState {
    queue: VecDeque<Task>,
    workers: Slab<Worker>,
    shutdown: bool,
}

struct PoolInner {
    config: PoolConfig,
    // Tasks accepted but not yet finished
    submitted: AtomicUsize,
    state: Mutex<PoolState>,
    work_cond: Condvar,
    term_cond: Condvar,
}

/// Worker pool that grows before it queues
///
/// A conventional pool enqueues a task whenever its queue has room and
/// only spawns beyond its core size once the queue is full.  This pool
/// inverts that: a task is enqueued only when an existing worker is
/// (or will shortly be) free to absorb it; otherwise a new worker is
/// spawned, up to `max_size`, and only at `max_size` does the queue
/// absorb backpressure.  Workloads with short bursts of small blocking
/// tasks get a worker per task quickly instead of piling up behind the
/// core workers.
///
/// Admission of one task, in order:
///
/// 1. If the accepted-but-unfinished count does not exceed the live
/// worker count, enqueue.
/// 2. Else, if below `max_size`, spawn a worker and hand it the task
/// directly.
/// 3. Else enqueue; if the queue is full, one immediate zero-wait
/// retry to enqueue is made before the task is rejected with
/// [`SyncError::Rejected`].
///
/// Tasks run under panic capture: a panicking task retires nothing and
/// leaks nothing, the worker simply moves on.  After any task
/// finishes, the accepted-but-unfinished count is decremented.
///
/// Once [`EagerGrowthThreadPool::shutdown`] has been called, further
/// submissions fail immediately; queued and running tasks complete
/// normally.
///
/// Clones share the same pool.
///
/// [`EagerGrowthThreadPool::shutdown`]: struct.EagerGrowthThreadPool.html#method.shutdown
/// [`SyncError::Rejected`]: enum.SyncError.html#variant.Rejected
pub struct EagerGrowthThreadPool {
    inner: Arc<PoolInner>,
}

impl EagerGrowthThreadPool {
    /// Create a pool with the given core and maximum worker counts and
    /// default keep-alive and queue capacity
    ///
    /// # Panics
    /// Panics if `max_size` is zero or below `core_size`.
    pub fn new(core_size: usize, max_size: usize) -> Self {
        Self::with_config(PoolConfig {
            core_size,
            max_size,
            ..PoolConfig::default()
        })
    }

    /// Create a pool from a full [`PoolConfig`]
    ///
    /// # Panics
    /// Panics if `max_size` or `queue_capacity` is zero, or if
    /// `max_size` is below `core_size`.
    ///
    /// [`PoolConfig`]: struct.PoolConfig.html
    pub fn with_config(config: PoolConfig) -> Self {
        assert!(config.max_size > 0, "pool max_size must be at least 1");
        assert!(
            config.core_size <= config.max_size,
            "pool core_size must not exceed max_size"
        );
        assert!(
            config.queue_capacity > 0,
            "pool queue_capacity must be at least 1"
        );
        Self {
            inner: Arc::new(PoolInner {
                config,
                submitted: AtomicUsize::new(0),
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    workers: Slab::new(),
                    shutdown: false,
                }),
                work_cond: Condvar::new(),
                term_cond: Condvar::new(),
            }),
        }
    }

    /// Accept a task for asynchronous execution.  See the type-level
    /// docs for the admission order.  Fails with
    /// [`SyncError::Rejected`] if the pool is shut down or saturated.
    ///
    /// [`SyncError::Rejected`]: enum.SyncError.html#variant.Rejected
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) -> Result<(), SyncError> {
        self.admit(Box::new(task))
    }

    /// Alias for [`EagerGrowthThreadPool::execute`]
    ///
    /// [`EagerGrowthThreadPool::execute`]: struct.EagerGrowthThreadPool.html#method.execute
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<(), SyncError> {
        self.admit(Box::new(task))
    }

    fn admit(&self, task: Task) -> Result<(), SyncError> {
        let inner = &self.inner;
        // Counted as in flight from acceptance until completion; must
        // be incremented before the admission decision looks at it
        let submitted = inner.submitted.fetch_add(1, Ordering::SeqCst) + 1;

        let mut guard = inner.state.lock();
        if guard.shutdown {
            drop(guard);
            inner.submitted.fetch_sub(1, Ordering::SeqCst);
            return Err(SyncError::Rejected(RejectReason::ShutDown));
        }

        let mut task = task;

        // There is, or will shortly be, a free worker to absorb it
        if submitted <= guard.workers.len() {
            match Self::enqueue(inner, &mut guard, task) {
                Ok(()) => return Ok(()),
                Err(t) => task = t,
            }
        }

        if guard.workers.len() < inner.config.max_size {
            // Grow instead of queuing
            match self.spawn_worker(&mut guard, task) {
                Ok(()) => return Ok(()),
                Err(t) => task = t,
            }
        } else {
            // No room to grow; the queue absorbs backpressure
            match Self::enqueue(inner, &mut guard, task) {
                Ok(()) => return Ok(()),
                Err(t) => task = t,
            }
        }

        // Zero-wait retry: re-take the lock once, in case a worker
        // retired or freed queue space concurrently
        drop(guard);
        let mut guard = inner.state.lock();
        if !guard.shutdown {
            if let Ok(()) = Self::enqueue(inner, &mut guard, task) {
                return Ok(());
            }
        }
        let reason = if guard.shutdown {
            RejectReason::ShutDown
        } else {
            RejectReason::Saturated
        };
        drop(guard);
        inner.submitted.fetch_sub(1, Ordering::SeqCst);
        Err(SyncError::Rejected(reason))
    }

    fn enqueue(
        inner: &PoolInner,
        guard: &mut MutexGuard<'_, PoolState>,
        task: Task,
    ) -> Result<(), Task> {
        if guard.queue.len() < inner.config.queue_capacity {
            guard.queue.push_back(task);
            inner.work_cond.notify_one();
            Ok(())
        } else {
            Err(task)
        }
    }

    fn spawn_worker(
        &self,
        guard: &mut MutexGuard<'_, PoolState>,
        task: Task,
    ) -> Result<(), Task> {
        let id = guard.workers.insert(Worker {
            handoff: Some(task),
        });
        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name(format!("threadlink-pool-{}", id))
            .spawn(move || Self::worker_loop(inner, id));
        match spawned {
            Ok(_) => {
                lifecycle_log!("pool worker {} spawned, {} live", id, guard.workers.len());
                Ok(())
            }
            Err(_) => {
                // OS refused the thread; hand the task back for the
                // enqueue retry
                let worker = guard.workers.remove(id);
                Err(worker.handoff.expect("handoff taken before worker ran"))
            }
        }
    }

    fn worker_loop(inner: Arc<PoolInner>, id: usize) {
        let mut guard = inner.state.lock();
        let mut next = guard.workers.get_mut(id).and_then(|w| w.handoff.take());
        loop {
            let task = loop {
                if let Some(t) = next.take() {
                    break t;
                }
                if let Some(t) = guard.queue.pop_front() {
                    break t;
                }
                if guard.shutdown {
                    // Queue drained; wind down
                    Self::retire(&inner, &mut guard, id);
                    return;
                }
                let timed_out = inner
                    .work_cond
                    .wait_for(&mut guard, inner.config.keep_alive)
                    .timed_out();
                if timed_out
                    && guard.queue.is_empty()
                    && guard.workers.len() > inner.config.core_size
                {
                    // Idle beyond keep-alive and not a core worker
                    Self::retire(&inner, &mut guard, id);
                    return;
                }
            };
            drop(guard);
            // A panicking task must not take the worker down with it
            let _ = catch_unwind(AssertUnwindSafe(task));
            inner.submitted.fetch_sub(1, Ordering::SeqCst);
            guard = inner.state.lock();
        }
    }

    fn retire(inner: &PoolInner, guard: &mut MutexGuard<'_, PoolState>, id: usize) {
        guard.workers.remove(id);
        lifecycle_log!("pool worker {} retired, {} live", id, guard.workers.len());
        if guard.workers.is_empty() {
            inner.term_cond.notify_all();
        }
    }

    /// Stop accepting tasks.  Queued and running tasks complete
    /// normally; workers exit once the queue is drained.  Idempotent.
    pub fn shutdown(&self) {
        {
            let mut guard = self.inner.state.lock();
            if guard.shutdown {
                return;
            }
            guard.shutdown = true;
        }
        self.inner.work_cond.notify_all();
    }

    /// Block until every worker has exited, or the timeout elapses.
    /// Returns `true` if the pool terminated in time.  Only meaningful
    /// after [`EagerGrowthThreadPool::shutdown`].
    ///
    /// [`EagerGrowthThreadPool::shutdown`]: struct.EagerGrowthThreadPool.html#method.shutdown
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.state.lock();
        while !guard.workers.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.inner
                .term_cond
                .wait_for(&mut guard, deadline - now);
        }
        true
    }

    /// Tasks accepted but not yet finished.  A snapshot.
    pub fn submitted_count(&self) -> usize {
        self.inner.submitted.load(Ordering::SeqCst)
    }

    /// Live worker count.  A snapshot.
    pub fn live_workers(&self) -> usize {
        self.inner.state.lock().workers.len()
    }

    /// Whether the pool has been shut down
    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().shutdown
    }

    /// Configured core worker count
    pub fn core_size(&self) -> usize {
        self.inner.config.core_size
    }

    /// Configured maximum worker count
    pub fn max_size(&self) -> usize {
        self.inner.config.max_size
    }

    // Check queued tasks, for tests
    #[cfg(test)]
    pub(crate) fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }
}

impl Clone for EagerGrowthThreadPool {
    /// Get another handle to the same pool
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl std::fmt::Debug for EagerGrowthThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.state.lock();
        f.debug_struct("EagerGrowthThreadPool")
            .field("live_workers", &guard.workers.len())
            .field("queued", &guard.queue.len())
            .field("submitted", &self.inner.submitted.load(Ordering::SeqCst))
            .field("shutdown", &guard.shutdown)
            .finish()
    }
}
