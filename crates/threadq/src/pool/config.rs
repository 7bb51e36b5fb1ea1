//! Pool configuration

use crate::error::{PoolError, PoolResult};

/// Environment variable overriding the worker count in [`PoolConfig::from_env`]
pub const NUM_THREADS_ENV: &str = "THREADQ_NUM_THREADS";

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads; also the cap on concurrently running tasks
    pub max_workers: usize,

    /// Worker threads are named `{prefix}-{index}`
    pub thread_name_prefix: String,

    /// Stack size per worker thread in bytes (None = platform default)
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl PoolConfig {
    /// Config with `max_workers` workers and default naming
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers,
            thread_name_prefix: "threadq-worker".to_string(),
            stack_size: None,
        }
    }

    /// Default config, with the worker count taken from `THREADQ_NUM_THREADS` when set
    pub fn from_env() -> PoolResult<Self> {
        match std::env::var(NUM_THREADS_ENV) {
            Ok(raw) => Self::parse_workers(&raw).map(Self::new),
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(std::env::VarError::NotUnicode(_)) => Err(PoolError::InvalidConfig(format!(
                "{} is not valid unicode",
                NUM_THREADS_ENV
            ))),
        }
    }

    fn parse_workers(raw: &str) -> PoolResult<usize> {
        raw.trim().parse::<usize>().map_err(|e| {
            PoolError::InvalidConfig(format!("{}={:?}: {}", NUM_THREADS_ENV, raw, e))
        })
    }

    /// Set the thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker stack size
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Reject unusable settings
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_workers == 0 {
            return Err(PoolError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(PoolError::InvalidConfig(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
