//! Bounded worker pool
//!
//! A [`Pool`] owns a fixed set of worker threads. Submitted work waits in a
//! FIFO queue until a worker is free, so at most `max_workers` tasks run at
//! once. Each task's signals are delivered to the reception context the
//! submission named, or to the submitting thread's current context.

mod config;
mod registry;
mod submission;
mod worker;

pub use config::{PoolConfig, NUM_THREADS_ENV};
pub use registry::PoolId;
pub use submission::Submission;

use crate::context::ContextHandle;
use crate::error::{PoolError, PoolResult};
use crate::signal::{Listener, SignalName, SignalSet};
use crate::task::{Task, TaskId, TaskState, TaskStatus};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use registry::TaskKey;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total tasks admitted
    pub submitted: u64,

    /// Tasks that emitted `result`
    pub succeeded: u64,

    /// Tasks that emitted `error`
    pub failed: u64,

    /// Tasks running right now
    pub active: usize,

    /// Tasks waiting for a worker
    pub queued: usize,

    /// Highest `active` seen so far
    pub peak_active: usize,
}

struct PoolState {
    queue: VecDeque<Task>,
    active: usize,
    accepting: bool,
    stopping: bool,
}

/// State shared between the pool handle and its workers
pub(crate) struct PoolShared {
    id: PoolId,
    max_workers: usize,
    state: Mutex<PoolState>,
    /// Signalled when a task is queued or the pool stops
    work_ready: Condvar,
    /// Signalled when the last running task finishes with an empty queue
    idle: Condvar,
    /// Live task records, released when a task's `finished` is delivered
    tasks: DashMap<TaskId, Arc<TaskStatus>>,
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    peak_active: AtomicUsize,
}

impl PoolShared {
    pub(crate) fn release(&self, task: TaskId) {
        if self.tasks.remove(&task).is_some() {
            tracing::trace!(pool = self.id.as_u64(), task = task.as_u64(), "task released");
        }
    }
}

/// Bounded thread pool
pub struct Pool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: PoolConfig,
}

impl Pool {
    /// Pool with one worker per CPU
    pub fn new() -> PoolResult<Self> {
        Self::with_config(PoolConfig::default())
    }

    /// Pool with `max_workers` workers
    pub fn with_max_workers(max_workers: usize) -> PoolResult<Self> {
        Self::with_config(PoolConfig::new(max_workers))
    }

    /// Pool from an explicit config. Fails on an invalid config or if a
    /// worker thread cannot be spawned.
    pub fn with_config(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;

        let shared = Arc::new(PoolShared {
            id: PoolId::next(),
            max_workers: config.max_workers,
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                active: 0,
                accepting: true,
                stopping: false,
            }),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
            tasks: DashMap::new(),
            submitted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            peak_active: AtomicUsize::new(0),
        });
        registry::register(shared.id, &shared);

        let pool = Pool {
            shared,
            workers: Mutex::new(Vec::with_capacity(config.max_workers)),
            config,
        };

        for index in 0..pool.config.max_workers {
            // On failure `pool` drops here, which stops the workers already started
            let handle = worker::spawn_worker(pool.shared.clone(), index, &pool.config)?;
            pool.workers.lock().push(handle);
        }

        tracing::info!(
            "multithreading with maximum {} threads",
            pool.config.max_workers
        );
        Ok(pool)
    }

    // ===== Submission =====

    /// Admit `submission` and queue it for a worker.
    ///
    /// All validation happens here, on the calling thread: unknown signal
    /// names, mismatched listeners and bad inputs are returned as errors and
    /// nothing is queued. Signals are delivered to the submission's
    /// `reply_to` context, or else to the calling thread's current one.
    pub fn submit(&self, submission: Submission) -> PoolResult<TaskId> {
        let admitted = submission.admit()?;
        let context = match admitted.reply_to {
            Some(context) => context,
            None => ContextHandle::current().ok_or(PoolError::NoReceptionContext)?,
        };

        let id = TaskId::new();
        let signals = SignalSet::for_task(id);
        for (signal, listener) in admitted.bindings {
            signals.connect(signal, listener, &context)?;
        }
        self.connect_aux(&signals, id, &context)?;

        let status = Arc::new(TaskStatus::new());
        let task = Task::new(id, admitted.func, admitted.inputs, signals, status.clone());

        {
            let mut state = self.shared.state.lock();
            if !state.accepting {
                return Err(PoolError::ShuttingDown);
            }
            self.shared.tasks.insert(id, status);
            state.queue.push_back(task);
            self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.work_ready.notify_one();

        tracing::debug!(
            pool = self.shared.id.as_u64(),
            task = id.as_u64(),
            context = context.name(),
            "task submitted"
        );
        Ok(id)
    }

    /// Pool-side bookkeeping listeners, run on the same context as the user's
    fn connect_aux(
        &self,
        signals: &SignalSet,
        id: TaskId,
        context: &ContextHandle,
    ) -> PoolResult<()> {
        let task = id.as_u64();
        signals.connect(
            SignalName::Result,
            Listener::value(move |v| tracing::debug!(task, "result: {:?}", v)),
            context,
        )?;
        signals.connect(
            SignalName::Progress,
            Listener::int(move |n| tracing::info!(task, "{}% done", n)),
            context,
        )?;

        let key = TaskKey {
            pool: self.shared.id,
            task: id,
        };
        signals.connect(
            SignalName::Finished,
            Listener::unit(move || {
                tracing::debug!(task, "task complete");
                key.release();
            }),
            context,
        )?;
        Ok(())
    }

    // ===== Queries =====

    /// Pool ID
    pub fn id(&self) -> PoolId {
        self.shared.id
    }

    /// Cap on concurrently running tasks
    pub fn max_workers(&self) -> usize {
        self.shared.max_workers
    }

    /// Config the pool was built from
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// State of a task that has not been released yet.
    ///
    /// A task is released once its `finished` delivery has run; after that
    /// this returns `None`.
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.shared.tasks.get(&id).map(|status| status.load())
    }

    /// Number of tasks running right now
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active
    }

    /// Number of tasks waiting for a worker
    pub fn queued_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let (active, queued) = {
            let state = self.shared.state.lock();
            (state.active, state.queue.len())
        };
        PoolStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            succeeded: self.shared.succeeded.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            active,
            queued,
            peak_active: self.shared.peak_active.load(Ordering::Relaxed),
        }
    }

    // ===== Lifecycle =====

    /// Block until no task is running or queued, or `timeout` passes.
    ///
    /// Returns true if the pool went idle. Deliveries may still be pending
    /// on reception contexts.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.active > 0 || !state.queue.is_empty() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.active == 0 && state.queue.is_empty();
            }
        }
        true
    }

    /// Stop accepting work, run everything already queued, then join the
    /// workers. Safe to call more than once.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.stopping {
                return;
            }
            state.accepting = false;
            state.stopping = true;
        }
        self.shared.work_ready.notify_all();

        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for handle in workers {
            // Called from inside a task: that worker exits on its own
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!(pool = self.shared.id.as_u64(), "worker thread panicked");
            }
        }
        tracing::debug!(pool = self.shared.id.as_u64(), "pool shut down");
    }

    /// Whether [`Pool::shutdown`] has started
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().stopping
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown();
        registry::unregister(self.shared.id);
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.shared.id)
            .field("max_workers", &self.shared.max_workers)
            .field("stats", &self.stats())
            .finish()
    }
}
