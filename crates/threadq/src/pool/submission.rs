//! Submission records, the front door of the pool

use crate::context::ContextHandle;
use crate::error::{PoolError, PoolResult};
use crate::signal::{Listener, SignalName, RESERVED_PARAMS};
use crate::task::{TaskArgs, TaskFn};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;

/// A unit of work waiting to be admitted.
///
/// ```rust,ignore
/// let sub = Submission::new(|args| {
///     let n = *args.get::<i64>("cdownv")?;
///     args.imgtime().emit((Value::new(1234i64), "done"))?;
///     Ok(n)
/// })
/// .input("cdownv", 3i64)
/// .requires("cdownv")
/// .connect("imgtime", Listener::value_text(|v, s| println!("{v:?} {s}")));
/// pool.submit(sub)?;
/// ```
pub struct Submission {
    func: TaskFn,
    inputs: FxHashMap<String, Value>,
    required: Vec<String>,
    bindings: Vec<(String, Listener)>,
    reply_to: Option<ContextHandle>,
}

/// A validated submission, ready to become a task
pub(crate) struct Admitted {
    pub(crate) func: TaskFn,
    pub(crate) inputs: FxHashMap<String, Value>,
    pub(crate) bindings: Vec<(SignalName, Listener)>,
    pub(crate) reply_to: Option<ContextHandle>,
}

impl Submission {
    /// Wrap a user operation. Its return value is delivered on `result`.
    pub fn new<F, R>(f: F) -> Self
    where
        F: FnOnce(&TaskArgs) -> anyhow::Result<R> + Send + 'static,
        R: Any + Send + Sync,
    {
        Self {
            func: Box::new(move |args: &TaskArgs| f(args).map(Value::new)),
            inputs: FxHashMap::default(),
            required: Vec::new(),
            bindings: Vec::new(),
            reply_to: None,
        }
    }

    /// Add a named input
    pub fn input<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.inputs.insert(name.into(), Value::new(value));
        self
    }

    /// Declare a parameter the operation needs; admission fails if it is
    /// neither an input nor an injected handle.
    pub fn requires(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Connect `listener` to the signal called `signal_name` on the new task
    pub fn connect(mut self, signal_name: impl Into<String>, listener: Listener) -> Self {
        self.bindings.push((signal_name.into(), listener));
        self
    }

    /// Deliver this task's signals to `context` instead of the submitting
    /// thread's current context
    pub fn reply_to(mut self, context: ContextHandle) -> Self {
        self.reply_to = Some(context);
        self
    }

    /// Validate names and shapes. Nothing is admitted if this fails.
    pub(crate) fn admit(self) -> PoolResult<Admitted> {
        if let Some(name) = self
            .inputs
            .keys()
            .find(|name| is_reserved(name))
        {
            return Err(PoolError::BadInput(format!(
                "`{}` is reserved for an injected signal handle",
                name
            )));
        }

        if let Some(missing) = self.required.iter().find(|name| {
            !self.inputs.contains_key(name.as_str()) && !is_reserved(name)
        }) {
            return Err(PoolError::BadInput(format!(
                "required parameter `{}` was not supplied",
                missing
            )));
        }

        let mut bindings = Vec::with_capacity(self.bindings.len());
        for (name, listener) in self.bindings {
            let signal: SignalName = name.parse()?;
            if listener.shape() != signal.shape() {
                return Err(PoolError::BadListener {
                    signal,
                    expected: signal.shape(),
                    found: listener.shape(),
                });
            }
            bindings.push((signal, listener));
        }

        Ok(Admitted {
            func: self.func,
            inputs: self.inputs,
            bindings,
            reply_to: self.reply_to,
        })
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_PARAMS.iter().any(|p| *p == name)
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("required", &self.required)
            .field(
                "bindings",
                &self.bindings.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .field("reply_to", &self.reply_to)
            .finish()
    }
}

impl fmt::Debug for Admitted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admitted")
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field(
                "bindings",
                &self.bindings.iter().map(|(s, _)| s.as_str()).collect::<Vec<_>>(),
            )
            .field("reply_to", &self.reply_to)
            .finish()
    }
}
