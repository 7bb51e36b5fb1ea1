//! Reception contexts: serialized inboxes where listeners run
//!
//! A [`ReceptionContext`] is owned by exactly one thread (typically the UI
//! thread). Other threads post deferred calls through a cloneable
//! [`ContextHandle`]; the owning thread drains them in arrival order. The
//! context registers itself as the *current* context of its thread so that
//! submissions made from that thread reply to it by default.

use crate::error::{PoolError, PoolResult};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A deferred listener call
pub(crate) type Deferred = Box<dyn FnOnce() + Send + 'static>;

/// Poll granularity of blocking loops
const POLL_INTERVAL: Duration = Duration::from_millis(10);

thread_local! {
    /// Live contexts of this thread, most recent last
    static CURRENT: RefCell<Vec<ContextHandle>> = const { RefCell::new(Vec::new()) };
}

/// Unique identifier for a reception context
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Sendable posting end of a reception context
#[derive(Clone)]
pub struct ContextHandle {
    id: ContextId,
    name: Arc<str>,
    tx: Sender<Deferred>,
}

impl ContextHandle {
    /// Context of the calling thread, if it owns one
    pub fn current() -> Option<ContextHandle> {
        CURRENT.with(|c| c.borrow().last().cloned())
    }

    /// Whether the calling thread owns this context
    pub fn is_current(&self) -> bool {
        CURRENT.with(|c| c.borrow().last().map(|h| h.id) == Some(self.id))
    }

    /// Context identifier
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Context name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a call to run on the context. Never blocks.
    pub fn post(&self, f: impl FnOnce() + Send + 'static) -> PoolResult<()> {
        self.post_boxed(Box::new(f))
    }

    pub(crate) fn post_boxed(&self, f: Deferred) -> PoolResult<()> {
        self.tx
            .send(f)
            .map_err(|_| PoolError::ContextClosed(self.name.to_string()))
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.id.0)
            .field("name", &self.name)
            .finish()
    }
}

/// Single-threaded reception context.
///
/// Not `Send`: listeners connected to it only ever run on the thread that
/// created it.
pub struct ReceptionContext {
    handle: ContextHandle,
    rx: Receiver<Deferred>,
    _not_send: PhantomData<*const ()>,
}

impl ReceptionContext {
    /// Create a context owned by the calling thread and make it current.
    ///
    /// When it is dropped the most recent context still alive on this thread
    /// becomes current again, whatever order the contexts are dropped in.
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = channel::unbounded();
        let name: String = name.into();
        let handle = ContextHandle {
            id: ContextId::next(),
            name: Arc::from(name.as_str()),
            tx,
        };
        CURRENT.with(|c| c.borrow_mut().push(handle.clone()));
        tracing::debug!(context = %handle.name, id = handle.id.0, "reception context created");
        Self {
            handle,
            rx,
            _not_send: PhantomData,
        }
    }

    /// Posting handle, for use from any thread
    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Context identifier
    pub fn id(&self) -> ContextId {
        self.handle.id
    }

    /// Number of calls waiting in the inbox
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Run every call currently queued, without blocking. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    self.dispatch(job);
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ran
    }

    /// Wait up to `timeout` for the first call, then drain the rest.
    pub fn run_once(&self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                self.dispatch(job);
                1 + self.drain()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Keep draining until `done` returns true or `timeout` elapses.
    ///
    /// Returns whether `done` was satisfied.
    pub fn run_until(&self, mut done: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.drain();
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.run_once((deadline - now).min(POLL_INTERVAL));
        }
    }

    fn dispatch(&self, job: Deferred) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
            let msg = panic
                .downcast_ref::<&'static str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(context = %self.handle.name, "listener panicked: {}", msg);
        }
    }
}

impl Drop for ReceptionContext {
    fn drop(&mut self) {
        let id = self.handle.id;
        // `try_with`: the thread local may already be gone at thread exit
        let _ = CURRENT.try_with(|c| c.borrow_mut().retain(|h| h.id != id));
    }
}

impl fmt::Debug for ReceptionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceptionContext")
            .field("handle", &self.handle)
            .field("pending", &self.pending())
            .finish()
    }
}

/// A reception context running its drain loop on a dedicated thread
pub struct ContextThread {
    handle: ContextHandle,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ContextThread {
    /// Spawn the thread and wait until its context is ready
    pub fn spawn(name: impl Into<String>) -> PoolResult<Self> {
        let name: String = name.into();
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = channel::bounded::<ContextHandle>(1);

        let stop = shutdown.clone();
        let ctx_name = name.clone();
        let thread = thread::Builder::new().name(name.clone()).spawn(move || {
            let ctx = ReceptionContext::new(ctx_name);
            if ready_tx.send(ctx.handle()).is_err() {
                return;
            }
            while !stop.load(Ordering::Acquire) {
                ctx.run_once(POLL_INTERVAL * 5);
            }
            ctx.drain();
        })?;

        let handle = ready_rx
            .recv()
            .map_err(|_| PoolError::ContextClosed(name))?;

        Ok(Self {
            handle,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Posting handle of the context
    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Drain what is queued, then stop and join the thread
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(context = %self.handle.name, "context thread panicked");
            }
        }
    }
}

impl Drop for ContextThread {
    fn drop(&mut self) {
        self.stop_inner();
    }
}
