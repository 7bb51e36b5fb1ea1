//! Error taxonomy for admission, connection, emission and task failure.
//!
//! Synchronous failures (a bad submission, a mismatched listener) come back as
//! [`PoolError`]. Failures that happen after admission never leave a worker
//! thread; they travel to listeners as a [`TaskError`] on the `error` signal.

use crate::signal::{PayloadShape, SignalName};
use std::fmt;

/// Errors returned synchronously by the pool, signal sets and contexts
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Submission or connection named a signal outside the catalog
    #[error("unknown signal name: {0:?}")]
    BadSignalName(String),

    /// Listener shape does not match the signal payload
    #[error("listener for `{signal}` takes {found}, signal carries {expected}")]
    BadListener {
        /// Signal the listener was connected to
        signal: SignalName,
        /// Shape declared by the signal
        expected: PayloadShape,
        /// Shape accepted by the listener
        found: PayloadShape,
    },

    /// Emitted payload does not match the signal signature
    #[error("payload for `{signal}` must be {expected}, got {found}")]
    BadPayload {
        /// Signal that was emitted
        signal: SignalName,
        /// Shape declared by the signal
        expected: PayloadShape,
        /// Shape (or value) that was actually emitted
        found: String,
    },

    /// Reserved parameter collision or missing required input
    #[error("bad input: {0}")]
    BadInput(String),

    /// The submitting thread has no reception context and none was given
    #[error("no reception context on this thread; create one or use Submission::reply_to")]
    NoReceptionContext,

    /// The pool is draining and no longer admits work
    #[error("pool is shutting down")]
    ShuttingDown,

    /// The signal set already delivered `finished`
    #[error("signal set is closed")]
    SignalClosed,

    /// `result` or `error` was already emitted for this task
    #[error("task outcome already emitted, dropping `{0}`")]
    OutcomeAlreadyEmitted(SignalName),

    /// The reception context was dropped
    #[error("reception context `{0}` is gone")]
    ContextClosed(String),

    /// A worker thread could not be spawned
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Pool configuration is unusable
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used throughout the crate
pub type PoolResult<T> = Result<T, PoolError>;

/// Tag carried by every `error` emission
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The user operation returned an error or panicked
    UserRaised,
    /// The operation rejected its inputs
    BadInput,
    /// The operation stopped cooperatively before finishing
    Cancelled,
    /// An invariant inside the core was violated
    Internal,
}

impl ErrorKind {
    /// Stable lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UserRaised => "user_raised",
            ErrorKind::BadInput => "bad_input",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure details delivered on the `error` signal
///
/// User operations may return a `TaskError` (wrapped in `anyhow::Error`) to
/// choose the tag themselves, e.g. [`TaskError::cancelled`] after observing a
/// stop flag. Any other error is reported as [`ErrorKind::UserRaised`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TaskError {
    /// Failure tag
    pub kind: ErrorKind,
    /// One-line message
    pub message: String,
    /// Free-form diagnostic text (error chain, panic location, ...)
    pub diagnostic: String,
}

impl TaskError {
    /// Create an error with an empty diagnostic
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            diagnostic: String::new(),
        }
    }

    /// Attach diagnostic text
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = diagnostic.into();
        self
    }

    /// User-raised failure
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UserRaised, message)
    }

    /// Cooperative cancellation
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Input rejected by the operation itself
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadInput, message)
    }

    /// Core invariant violation
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Translate an error returned by a user operation.
    ///
    /// A `TaskError` anywhere in the chain keeps its tag; everything else is
    /// `UserRaised` with the full `{:?}` chain as diagnostic.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        if let Some(task_err) = err.downcast_ref::<TaskError>() {
            let mut task_err = task_err.clone();
            if task_err.diagnostic.is_empty() {
                task_err.diagnostic = format!("{:?}", err);
            }
            return task_err;
        }
        Self::user(err.to_string()).with_diagnostic(format!("{:?}", err))
    }

    /// Translate a panic payload caught on a worker thread
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        let thread = std::thread::current();
        let diagnostic = format!(
            "panicked on thread '{}': {}",
            thread.name().unwrap_or("<unnamed>"),
            message
        );
        Self::user(message).with_diagnostic(diagnostic)
    }
}

impl From<PoolError> for TaskError {
    fn from(err: PoolError) -> Self {
        let kind = match err {
            PoolError::BadInput(_) => ErrorKind::BadInput,
            _ => ErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_plain_error_is_user_raised() {
        let err = anyhow::anyhow!("disk on fire");
        let task_err = TaskError::from_anyhow(err);
        assert_eq!(task_err.kind, ErrorKind::UserRaised);
        assert_eq!(task_err.message, "disk on fire");
        assert!(task_err.diagnostic.contains("disk on fire"));
    }

    #[test]
    fn test_task_error_keeps_its_tag() {
        let err = anyhow::Error::new(TaskError::cancelled("stop requested"));
        let task_err = TaskError::from_anyhow(err);
        assert_eq!(task_err.kind, ErrorKind::Cancelled);
        assert_eq!(task_err.message, "stop requested");
    }

    #[test]
    fn test_context_chain_lands_in_diagnostic() {
        let res: anyhow::Result<()> = Err(anyhow::anyhow!("root cause")).context("loading frame");
        let task_err = TaskError::from_anyhow(res.unwrap_err());
        assert_eq!(task_err.message, "loading frame");
        assert!(task_err.diagnostic.contains("root cause"));
    }

    #[test]
    fn test_panic_payloads() {
        let from_str = TaskError::from_panic(Box::new("boom"));
        assert_eq!(from_str.message, "boom");
        let from_string = TaskError::from_panic(Box::new(String::from("bang")));
        assert_eq!(from_string.message, "bang");
        let other = TaskError::from_panic(Box::new(7u32));
        assert_eq!(other.kind, ErrorKind::UserRaised);
    }

    #[test]
    fn test_pool_error_conversion() {
        let err: TaskError = PoolError::BadInput("missing `x`".into()).into();
        assert_eq!(err.kind, ErrorKind::BadInput);
        let err: TaskError = PoolError::SignalClosed.into();
        assert_eq!(err.kind, ErrorKind::Internal);
    }
}
