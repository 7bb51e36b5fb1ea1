//! Task structure and execution protocol

use crate::error::{ErrorKind, PoolError, TaskError};
use crate::signal::{SignalHandle, SignalName, SignalSet, RESERVED_PARAMS};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

/// User operation run on a worker thread
pub(crate) type TaskFn = Box<dyn FnOnce(&TaskArgs) -> anyhow::Result<Value> + Send + 'static>;

/// Unique identifier for a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Admitted, waiting for a worker
    Pending,
    /// Currently executing on a worker
    Running,
    /// Returned normally
    Succeeded,
    /// Failed; an `error` was emitted
    Failed,
}

impl TaskState {
    /// Whether the task is done
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    /// Allowed transitions: Pending → Running → {Succeeded | Failed}
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Running, TaskState::Succeeded)
                | (TaskState::Running, TaskState::Failed)
        )
    }

    fn to_u8(self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Running => 1,
            TaskState::Succeeded => 2,
            TaskState::Failed => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Succeeded,
            _ => TaskState::Failed,
        }
    }
}

/// Lock-free lifecycle state, shared between a task and the pool's registry
#[derive(Debug)]
pub(crate) struct TaskStatus(AtomicU8);

impl TaskStatus {
    pub(crate) fn new() -> Self {
        TaskStatus(AtomicU8::new(TaskState::Pending.to_u8()))
    }

    pub(crate) fn load(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` if the transition is allowed. Returns false otherwise.
    pub(crate) fn advance(&self, next: TaskState) -> bool {
        let current = self.load();
        if !current.can_transition_to(next) {
            return false;
        }
        self.0
            .compare_exchange(current.to_u8(), next.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Arguments seen by a user operation: its inputs plus the injected signal handles
pub struct TaskArgs {
    task_id: TaskId,
    inputs: FxHashMap<String, Value>,
    progress: SignalHandle,
    result: SignalHandle,
    obj: SignalHandle,
    info: SignalHandle,
    imgtime: SignalHandle,
}

impl TaskArgs {
    pub(crate) fn new(task_id: TaskId, inputs: FxHashMap<String, Value>, signals: &SignalSet) -> Self {
        Self {
            task_id,
            inputs,
            progress: signals.handle(SignalName::Progress),
            result: signals.handle(SignalName::Result),
            obj: signals.handle(SignalName::Obj),
            info: signals.handle(SignalName::Info),
            imgtime: signals.handle(SignalName::ImgTime),
        }
    }

    /// Task being run
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Raw input by name
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    /// Whether `name` is an input or an injected handle
    pub fn contains(&self, name: &str) -> bool {
        self.inputs.contains_key(name) || RESERVED_PARAMS.iter().any(|p| *p == name)
    }

    /// Typed input. Missing or mistyped inputs are `BadInput` failures.
    pub fn get<T: Any>(&self, name: &str) -> Result<&T, TaskError> {
        let value = self
            .inputs
            .get(name)
            .ok_or_else(|| TaskError::bad_input(format!("missing input `{}`", name)))?;
        value.downcast_ref::<T>().ok_or_else(|| {
            TaskError::bad_input(format!(
                "input `{}` is {}, expected {}",
                name,
                value.type_name(),
                std::any::type_name::<T>()
            ))
        })
    }

    /// Injected handle by parameter name, e.g. `"progress_callback"`
    pub fn handle(&self, param: &str) -> Option<&SignalHandle> {
        match SignalName::from_injected_param(param)? {
            SignalName::Progress => Some(&self.progress),
            SignalName::Result => Some(&self.result),
            SignalName::Obj => Some(&self.obj),
            SignalName::Info => Some(&self.info),
            SignalName::ImgTime => Some(&self.imgtime),
            SignalName::Finished | SignalName::Error => None,
        }
    }

    /// `progress_callback`
    pub fn progress(&self) -> &SignalHandle {
        &self.progress
    }

    /// `result_callback`
    pub fn result(&self) -> &SignalHandle {
        &self.result
    }

    /// `obj_callback`
    pub fn obj(&self) -> &SignalHandle {
        &self.obj
    }

    /// `info_callback`
    pub fn info(&self) -> &SignalHandle {
        &self.info
    }

    /// `imgtime_callback`
    pub fn imgtime(&self) -> &SignalHandle {
        &self.imgtime
    }
}

/// How a task run ended, as seen by the worker
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Completion {
    pub(crate) state: TaskState,
    /// `finished` could not be posted to at least one listener's context
    pub(crate) finished_undelivered: bool,
}

/// One unit of work: a user operation, its inputs and its signal set
pub(crate) struct Task {
    id: TaskId,
    func: TaskFn,
    inputs: FxHashMap<String, Value>,
    signals: SignalSet,
    status: std::sync::Arc<TaskStatus>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        func: TaskFn,
        inputs: FxHashMap<String, Value>,
        signals: SignalSet,
        status: std::sync::Arc<TaskStatus>,
    ) -> Self {
        Self {
            id,
            func,
            inputs,
            signals,
            status,
        }
    }

    /// Get the Task's unique ID
    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    /// Get the current state
    pub(crate) fn state(&self) -> TaskState {
        self.status.load()
    }

    /// Execute on the calling (worker) thread.
    ///
    /// Emits exactly one of `result`/`error`, then `finished` as the final
    /// act. Nothing raised by the user operation escapes. Consumes the task,
    /// so it can never run twice.
    pub(crate) fn run(self) -> Completion {
        let Task {
            id,
            func,
            inputs,
            signals,
            status,
        } = self;

        if !status.advance(TaskState::Running) {
            let err = TaskError::internal(format!(
                "task {} cannot start from state {:?}",
                id.as_u64(),
                status.load()
            ));
            return Self::conclude(id, &signals, &status, Err(err));
        }

        let started = Instant::now();
        tracing::debug!(task = id.as_u64(), "task running");

        let args = TaskArgs::new(id, inputs, &signals);
        let outcome = match catch_unwind(AssertUnwindSafe(|| func(&args))) {
            Ok(Ok(value)) => match signals.take_fault() {
                Some(fault) => Err(fault),
                None => Ok(value),
            },
            Ok(Err(err)) => Err(TaskError::from_anyhow(err)),
            Err(panic) => Err(TaskError::from_panic(panic)),
        };
        drop(args);

        tracing::debug!(
            task = id.as_u64(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "task returned"
        );
        Self::conclude(id, &signals, &status, outcome)
    }

    fn conclude(
        id: TaskId,
        signals: &SignalSet,
        status: &TaskStatus,
        outcome: Result<Value, TaskError>,
    ) -> Completion {
        let terminal = match outcome {
            Ok(value) => {
                if let Err(e) = signals.emit(SignalName::Result, value) {
                    // The operation already pushed its result through `result_callback`
                    tracing::debug!(task = id.as_u64(), "{}", e);
                }
                TaskState::Succeeded
            }
            Err(err) => {
                if err.kind == ErrorKind::UserRaised {
                    tracing::debug!(task = id.as_u64(), "task raised: {}", err.message);
                } else {
                    tracing::warn!(task = id.as_u64(), kind = %err.kind, "task failed: {}", err.message);
                }
                match signals.emit(SignalName::Error, err) {
                    // Listeners already saw `result`; the state follows what they saw
                    Err(PoolError::OutcomeAlreadyEmitted(_)) => {
                        tracing::warn!(
                            task = id.as_u64(),
                            "task failed after emitting its result; error not delivered"
                        );
                        TaskState::Succeeded
                    }
                    _ => TaskState::Failed,
                }
            }
        };

        if !status.advance(terminal) {
            tracing::error!(task = id.as_u64(), state = ?status.load(), "task left in non-running state");
        }
        let undelivered = signals.finish().unwrap_or(0);
        if undelivered > 0 {
            tracing::debug!(task = id.as_u64(), undelivered, "finished not deliverable");
        }
        Completion {
            state: terminal,
            finished_undelivered: undelivered > 0,
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .finish()
    }
}
