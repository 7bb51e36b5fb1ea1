//! Worker threads that execute Tasks

use super::{PoolConfig, PoolShared};
use crate::error::PoolResult;
use crate::task::TaskState;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Start worker `index`; it runs until the pool stops and its queue is empty
pub(crate) fn spawn_worker(
    shared: Arc<PoolShared>,
    index: usize,
    config: &PoolConfig,
) -> PoolResult<JoinHandle<()>> {
    let mut builder =
        thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, index));
    if let Some(size) = config.stack_size {
        builder = builder.stack_size(size);
    }
    let handle = builder.spawn(move || run_loop(&shared, index))?;
    Ok(handle)
}

/// Worker thread main loop
fn run_loop(shared: &PoolShared, index: usize) {
    tracing::debug!(pool = shared.id.as_u64(), worker = index, "worker started");

    loop {
        // Claim a slot and a task together, so `active` never exceeds the
        // number of workers.
        let task = {
            let mut state = shared.state.lock();
            loop {
                if let Some(task) = state.queue.pop_front() {
                    state.active += 1;
                    shared.peak_active.fetch_max(state.active, Ordering::Relaxed);
                    break task;
                }
                if state.stopping {
                    tracing::debug!(pool = shared.id.as_u64(), worker = index, "worker exiting");
                    return;
                }
                shared.work_ready.wait(&mut state);
            }
        };

        let id = task.id();
        let completion = task.run();
        match completion.state {
            TaskState::Succeeded => shared.succeeded.fetch_add(1, Ordering::Relaxed),
            _ => shared.failed.fetch_add(1, Ordering::Relaxed),
        };
        // Nobody will run the release listener
        if completion.finished_undelivered {
            shared.release(id);
        }

        let mut state = shared.state.lock();
        state.active -= 1;
        if state.active == 0 && state.queue.is_empty() {
            shared.idle.notify_all();
        }
    }
}
