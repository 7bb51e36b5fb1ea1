//! Signal sets and emitter handles

use super::{Listener, Payload, SignalName};
use crate::context::ContextHandle;
use crate::error::{PoolError, PoolResult, TaskError};
use crate::task::TaskId;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies one connection, for [`SignalSet::disconnect`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

struct Connection {
    id: ConnectionId,
    listener: Listener,
    context: ContextHandle,
    /// Cleared on disconnect; deliveries already queued check it before running
    alive: Arc<AtomicBool>,
}

impl Connection {
    /// Queue one delivery. Returns false if the context is gone.
    fn post(&self, signal: SignalName, payload: Payload) -> bool {
        let listener = self.listener.clone();
        let alive = self.alive.clone();
        let posted = self.context.post_boxed(Box::new(move || {
            if alive.load(Ordering::Acquire) {
                listener.invoke(payload);
            }
        }));
        match posted {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!(signal = %signal, connection = self.id.0, "delivery dropped: {}", e);
                false
            }
        }
    }
}

#[derive(Default)]
struct Connections {
    closed: bool,
    slots: [Vec<Connection>; SignalName::COUNT],
}

struct SetInner {
    owner: Option<TaskId>,
    connections: RwLock<Connections>,
    /// Set once `result` or `error` went out
    outcome_emitted: AtomicBool,
    /// Task-owned sets hold back payload faults until the task finishes
    defer_faults: bool,
    fault: Mutex<Option<TaskError>>,
}

/// Named, typed event channels attached to one task.
///
/// Cloning shares the same set. Emissions are posted to each listener's
/// reception context; the emitting thread never runs a listener.
#[derive(Clone)]
pub struct SignalSet {
    inner: Arc<SetInner>,
}

impl SignalSet {
    /// Standalone set. Payload faults are reported on its `error` signal right away.
    pub fn new() -> Self {
        Self::build(None, false)
    }

    /// Set owned by a task; payload faults are collected and reported by the
    /// task as its single `error` outcome.
    pub(crate) fn for_task(owner: TaskId) -> Self {
        Self::build(Some(owner), true)
    }

    fn build(owner: Option<TaskId>, defer_faults: bool) -> Self {
        Self {
            inner: Arc::new(SetInner {
                owner,
                connections: RwLock::new(Connections::default()),
                outcome_emitted: AtomicBool::new(false),
                defer_faults,
                fault: Mutex::new(None),
            }),
        }
    }

    /// Task owning this set, if any
    pub fn owner(&self) -> Option<TaskId> {
        self.inner.owner
    }

    /// Subscribe `listener` to `signal`; it will run on `context`.
    pub fn connect(
        &self,
        signal: SignalName,
        listener: Listener,
        context: &ContextHandle,
    ) -> PoolResult<ConnectionId> {
        check_listener(signal, &listener)?;
        let mut conns = self.inner.connections.write();
        if conns.closed {
            return Err(PoolError::SignalClosed);
        }
        let id = ConnectionId::next();
        conns.slots[signal.index()].push(Connection {
            id,
            listener,
            context: context.clone(),
            alive: Arc::new(AtomicBool::new(true)),
        });
        Ok(id)
    }

    /// [`SignalSet::connect`] with a string-keyed signal name
    pub fn connect_by_name(
        &self,
        signal: &str,
        listener: Listener,
        context: &ContextHandle,
    ) -> PoolResult<ConnectionId> {
        self.connect(signal.parse()?, listener, context)
    }

    /// Unsubscribe. Deliveries already queued for this connection are discarded.
    ///
    /// Returns false if the connection was not found.
    pub fn disconnect(&self, signal: SignalName, id: ConnectionId) -> bool {
        let mut conns = self.inner.connections.write();
        let slot = &mut conns.slots[signal.index()];
        match slot.iter().position(|c| c.id == id) {
            Some(pos) => {
                let conn = slot.remove(pos);
                conn.alive.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Number of listeners on `signal`
    pub fn listener_count(&self, signal: SignalName) -> usize {
        self.inner.connections.read().slots[signal.index()].len()
    }

    /// Whether `finished` has been delivered
    pub fn is_closed(&self) -> bool {
        self.inner.connections.read().closed
    }

    /// Emitter handle for `signal`
    pub fn handle(&self, signal: SignalName) -> SignalHandle {
        SignalHandle {
            signal,
            set: self.clone(),
        }
    }

    /// Emitter handle looked up by name
    pub fn lookup(&self, signal: &str) -> PoolResult<SignalHandle> {
        Ok(self.handle(signal.parse()?))
    }

    /// Emit on `signal` from any thread.
    ///
    /// Validates the payload, then posts one deferred call per listener.
    /// `finished` is reserved for the owning task; emitting it on a
    /// task-owned set is a payload fault.
    pub fn emit(&self, signal: SignalName, payload: impl Into<Payload>) -> PoolResult<()> {
        let payload = payload.into();
        let checked = if signal == SignalName::Finished && self.inner.owner.is_some() {
            Err(PoolError::BadPayload {
                signal,
                expected: signal.shape(),
                found: "emission from task code".to_string(),
            })
        } else {
            payload.check(signal)
        };
        if let Err(err) = checked {
            self.report_fault(&err);
            return Err(err);
        }

        let conns = self.inner.connections.read();
        if conns.closed {
            return Err(PoolError::SignalClosed);
        }
        if signal.is_outcome() && self.inner.outcome_emitted.swap(true, Ordering::AcqRel) {
            return Err(PoolError::OutcomeAlreadyEmitted(signal));
        }
        if signal == SignalName::Finished {
            drop(conns);
            return if self.finish().is_some() {
                Ok(())
            } else {
                Err(PoolError::SignalClosed)
            };
        }
        for conn in &conns.slots[signal.index()] {
            conn.post(signal, payload.clone());
        }
        Ok(())
    }

    /// Deliver without the outcome guard; used for fault reports, which may
    /// repeat and must not consume the task's single outcome.
    fn post_unchecked(&self, signal: SignalName, payload: Payload) {
        let conns = self.inner.connections.read();
        if conns.closed {
            return;
        }
        for conn in &conns.slots[signal.index()] {
            conn.post(signal, payload.clone());
        }
    }

    /// Whether `result` or `error` already went out
    pub fn outcome_emitted(&self) -> bool {
        self.inner.outcome_emitted.load(Ordering::Acquire)
    }

    /// Post `finished` and close the set. Later emissions fail with
    /// `SignalClosed`, so `finished` is the last thing any listener sees.
    ///
    /// Returns the number of `finished` deliveries whose context was already
    /// gone, or `None` if the set was closed before.
    pub(crate) fn finish(&self) -> Option<usize> {
        let mut conns = self.inner.connections.write();
        if conns.closed {
            return None;
        }
        let undelivered = conns.slots[SignalName::Finished.index()]
            .iter()
            .filter(|conn| !conn.post(SignalName::Finished, Payload::Unit))
            .count();
        conns.closed = true;
        // Listeners may capture pool-side state; drop them now that nothing
        // else can be delivered.
        for slot in conns.slots.iter_mut() {
            slot.clear();
        }
        Some(undelivered)
    }

    /// Take the first payload fault recorded while the task ran
    pub(crate) fn take_fault(&self) -> Option<TaskError> {
        self.inner.fault.lock().take()
    }

    fn report_fault(&self, err: &PoolError) {
        tracing::warn!(task = ?self.inner.owner.map(|t| t.as_u64()), "{}", err);
        let fault = TaskError::internal(err.to_string());
        if self.inner.defer_faults {
            let mut slot = self.inner.fault.lock();
            if slot.is_none() {
                *slot = Some(fault);
            }
        } else {
            self.post_unchecked(SignalName::Error, Payload::Error(fault));
        }
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conns = self.inner.connections.read();
        let counts: Vec<_> = SignalName::ALL
            .iter()
            .map(|s| (s.as_str(), conns.slots[s.index()].len()))
            .collect();
        f.debug_struct("SignalSet")
            .field("owner", &self.inner.owner)
            .field("closed", &conns.closed)
            .field("listeners", &counts)
            .finish()
    }
}

fn check_listener(signal: SignalName, listener: &Listener) -> PoolResult<()> {
    if listener.shape() != signal.shape() {
        return Err(PoolError::BadListener {
            signal,
            expected: signal.shape(),
            found: listener.shape(),
        });
    }
    Ok(())
}

/// Emitter end of one signal. Cheap to clone and free to move across threads.
#[derive(Clone)]
pub struct SignalHandle {
    signal: SignalName,
    set: SignalSet,
}

impl SignalHandle {
    /// Signal this handle emits on
    pub fn signal(&self) -> SignalName {
        self.signal
    }

    /// Emit one event. Never waits for listeners.
    pub fn emit(&self, payload: impl Into<Payload>) -> PoolResult<()> {
        self.set.emit(self.signal, payload)
    }
}

impl fmt::Debug for SignalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalHandle")
            .field("signal", &self.signal)
            .field("owner", &self.set.owner())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ReceptionContext;
    use crate::error::ErrorKind;
    use crate::value::Value;
    use std::thread;

    fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, Arc<Mutex<Vec<T>>>) {
        let v = Arc::new(Mutex::new(Vec::new()));
        (v.clone(), v)
    }

    #[test]
    fn test_emit_is_deferred_to_context() {
        let ctx = ReceptionContext::new("test");
        let set = SignalSet::new();
        let (seen, sink) = recorder();
        set.connect(SignalName::Info, Listener::text(move |s| sink.lock().push(s)), &ctx.handle())
            .unwrap();

        set.emit(SignalName::Info, "g").unwrap();
        assert!(seen.lock().is_empty());
        ctx.drain();
        assert_eq!(*seen.lock(), vec!["g".to_string()]);
    }

    #[test]
    fn test_bad_listener_rejected() {
        let ctx = ReceptionContext::new("test");
        let set = SignalSet::new();
        let err = set
            .connect(SignalName::ImgTime, Listener::text(|_| {}), &ctx.handle())
            .unwrap_err();
        assert!(matches!(err, PoolError::BadListener { signal: SignalName::ImgTime, .. }));
        assert_eq!(set.listener_count(SignalName::ImgTime), 0);
    }

    #[test]
    fn test_connect_by_unknown_name() {
        let ctx = ReceptionContext::new("test");
        let set = SignalSet::new();
        let err = set
            .connect_by_name("status", Listener::text(|_| {}), &ctx.handle())
            .unwrap_err();
        assert!(matches!(err, PoolError::BadSignalName(_)));
        assert!(set.lookup("status").is_err());
        assert_eq!(set.lookup("info").unwrap().signal(), SignalName::Info);
    }

    #[test]
    fn test_bad_payload_reported_on_error_signal() {
        let ctx = ReceptionContext::new("test");
        let set = SignalSet::new();
        let (errors, sink) = recorder();
        set.connect(SignalName::Error, Listener::error(move |e| sink.lock().push(e)), &ctx.handle())
            .unwrap();

        let err = set.emit(SignalName::Progress, "fifty").unwrap_err();
        assert!(matches!(err, PoolError::BadPayload { .. }));
        ctx.drain();
        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Internal);
    }

    #[test]
    fn test_repeated_faults_do_not_consume_outcome() {
        let ctx = ReceptionContext::new("test");
        let set = SignalSet::new();
        let (errors, sink) = recorder();
        let (results, rsink) = recorder();
        set.connect(SignalName::Error, Listener::error(move |e| sink.lock().push(e)), &ctx.handle())
            .unwrap();
        set.connect(SignalName::Result, Listener::value(move |v| rsink.lock().push(v)), &ctx.handle())
            .unwrap();

        assert!(set.emit(SignalName::Progress, "a").is_err());
        assert!(set.emit(SignalName::Progress, "b").is_err());
        assert!(!set.outcome_emitted());
        set.emit(SignalName::Result, Value::new(1i64)).unwrap();
        ctx.drain();

        let errors = errors.lock();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind == ErrorKind::Internal));
        assert_eq!(results.lock().len(), 1);
    }

    #[test]
    fn test_finish_counts_undeliverable() {
        let set = SignalSet::for_task(TaskId::new());
        let handle = {
            let ctx = ReceptionContext::new("short-lived");
            ctx.handle()
        };
        set.connect(SignalName::Finished, Listener::unit(|| {}), &handle)
            .unwrap();
        assert_eq!(set.finish(), Some(1));
    }

    #[test]
    fn test_task_owned_set_defers_faults() {
        let ctx = ReceptionContext::new("test");
        let set = SignalSet::for_task(TaskId::new());
        let (errors, sink) = recorder();
        set.connect(SignalName::Error, Listener::error(move |e| sink.lock().push(e)), &ctx.handle())
            .unwrap();

        assert!(set.emit(SignalName::Info, 5i64).is_err());
        assert!(set.emit(SignalName::Finished, ()).is_err());
        ctx.drain();
        assert!(errors.lock().is_empty());
        let fault = set.take_fault().unwrap();
        assert_eq!(fault.kind, ErrorKind::Internal);
        assert!(set.take_fault().is_none());
    }

    #[test]
    fn test_disconnect_discards_queued() {
        let ctx = ReceptionContext::new("test");
        let set = SignalSet::new();
        let (seen, sink) = recorder();
        let id = set
            .connect(SignalName::Progress, Listener::int(move |n| sink.lock().push(n)), &ctx.handle())
            .unwrap();

        set.emit(SignalName::Progress, 10i64).unwrap();
        assert!(set.disconnect(SignalName::Progress, id));
        assert!(!set.disconnect(SignalName::Progress, id));
        set.emit(SignalName::Progress, 20i64).unwrap();
        ctx.drain();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_outcome_fires_once() {
        let ctx = ReceptionContext::new("test");
        let set = SignalSet::new();
        let (results, sink) = recorder();
        set.connect(SignalName::Result, Listener::value(move |v| sink.lock().push(v)), &ctx.handle())
            .unwrap();

        set.emit(SignalName::Result, Value::new(1i64)).unwrap();
        let err = set.emit(SignalName::Error, TaskError::user("late")).unwrap_err();
        assert!(matches!(err, PoolError::OutcomeAlreadyEmitted(SignalName::Error)));
        assert!(set.outcome_emitted());
        ctx.drain();
        assert_eq!(results.lock().len(), 1);
    }

    #[test]
    fn test_finished_closes_set() {
        let ctx = ReceptionContext::new("test");
        let set = SignalSet::for_task(TaskId::new());
        let (order, sink) = recorder();
        let s2 = sink.clone();
        set.connect(SignalName::Info, Listener::text(move |s| sink.lock().push(s)), &ctx.handle())
            .unwrap();
        set.connect(
            SignalName::Finished,
            Listener::unit(move || s2.lock().push("finished".to_string())),
            &ctx.handle(),
        )
        .unwrap();

        let info = set.handle(SignalName::Info);
        info.emit("before").unwrap();
        assert_eq!(set.finish(), Some(0));
        assert_eq!(set.finish(), None);
        assert!(matches!(info.emit("after"), Err(PoolError::SignalClosed)));
        assert!(set.is_closed());
        assert_eq!(set.listener_count(SignalName::Info), 0);
        ctx.drain();
        assert_eq!(*order.lock(), vec!["before".to_string(), "finished".to_string()]);
    }

    #[test]
    fn test_handles_emit_from_other_threads_in_order() {
        let ctx = ReceptionContext::new("test");
        let set = SignalSet::new();
        let (seen, sink) = recorder();
        set.connect(SignalName::Progress, Listener::int(move |n| sink.lock().push(n)), &ctx.handle())
            .unwrap();

        let handle = set.handle(SignalName::Progress);
        thread::spawn(move || {
            for n in 0..=100i64 {
                handle.emit(n).unwrap();
            }
        })
        .join()
        .unwrap();
        ctx.drain();
        assert_eq!(*seen.lock(), (0..=100).collect::<Vec<i64>>());
    }
}
