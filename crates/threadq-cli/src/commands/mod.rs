//! Subcommand implementations

pub mod colors;
pub mod countdown;
pub mod info;
pub mod stream;

use anyhow::Context;
use std::time::Duration;
use threadq::{PoolConfig, NUM_THREADS_ENV};

/// Upper bound on how long a demo waits for its tasks
pub const WAIT_LIMIT: Duration = Duration::from_secs(120);

/// Pool config from the environment, with `--threads` taking precedence
pub fn pool_config(threads: Option<usize>) -> anyhow::Result<PoolConfig> {
    let mut config = match threads {
        Some(n) => PoolConfig::new(n),
        None => PoolConfig::from_env().with_context(|| format!("reading {}", NUM_THREADS_ENV))?,
    };
    config = config.with_thread_name_prefix("threadq-demo");
    config.validate().context("invalid --threads")?;
    Ok(config)
}
