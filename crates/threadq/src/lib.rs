//! threadq: a bounded worker pool with typed signals
//!
//! This crate provides:
//! - [`Pool`]: fixed worker threads pulling from a FIFO queue, so at most
//!   `max_workers` tasks run at once
//! - tasks: one user operation plus its execution protocol (exactly one
//!   of `result`/`error`, then `finished`), seen by the operation as [`TaskArgs`]
//! - [`SignalSet`]: the fixed catalog of typed signals a task emits on
//! - [`ReceptionContext`]: a single-threaded inbox where listeners run,
//!   in emission order, on the thread that owns it
//!
//! ```rust,ignore
//! let ctx = ReceptionContext::new("ui");
//! let pool = Pool::with_max_workers(4)?;
//! pool.submit(
//!     Submission::new(|args| {
//!         args.progress().emit(50i64)?;
//!         Ok("done")
//!     })
//!     .connect("progress", Listener::int(|n| println!("{n}%"))),
//! )?;
//! pool.wait_idle(Duration::from_secs(1));
//! ctx.drain();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod context;
pub mod error;
pub mod pool;
pub mod signal;
pub mod task;
pub mod value;

pub use context::{ContextHandle, ContextId, ContextThread, ReceptionContext};
pub use error::{ErrorKind, PoolError, PoolResult, TaskError};
pub use pool::{Pool, PoolConfig, PoolId, PoolStats, Submission, NUM_THREADS_ENV};
pub use signal::{
    ConnectionId, Listener, Payload, PayloadShape, SignalHandle, SignalName, SignalSet,
    RESERVED_PARAMS,
};
pub use task::{TaskArgs, TaskId, TaskState};
pub use value::{StopFlag, Value};
