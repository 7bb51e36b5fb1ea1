//! Weak pool lookup used by the auxiliary listeners.
//!
//! Listeners live inside a task's signal set, and the pool owns the task.
//! Instead of capturing the pool, auxiliary listeners carry a [`TaskKey`]
//! and resolve the pool through this registry when they run; a dropped pool
//! simply fails to resolve.

use super::PoolShared;
use crate::task::TaskId;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static POOLS: Lazy<DashMap<PoolId, Weak<PoolShared>>> = Lazy::new(DashMap::new);

/// Unique identifier for a pool
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PoolId(u64);

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

impl PoolId {
    pub(crate) fn next() -> Self {
        PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

pub(crate) fn register(id: PoolId, shared: &Arc<PoolShared>) {
    POOLS.insert(id, Arc::downgrade(shared));
}

pub(crate) fn unregister(id: PoolId) {
    POOLS.remove(&id);
}

pub(crate) fn resolve(id: PoolId) -> Option<Arc<PoolShared>> {
    // Clone the weak pointer out so the shard lock is not held while upgrading
    let weak = POOLS.get(&id).map(|entry| entry.value().clone())?;
    weak.upgrade()
}

/// Non-owning reference to one task of one pool
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TaskKey {
    pub(crate) pool: PoolId,
    pub(crate) task: TaskId,
}

impl TaskKey {
    /// Drop the pool's record of this task, if the pool still exists
    pub(crate) fn release(self) {
        match resolve(self.pool) {
            Some(shared) => shared.release(self.task),
            None => tracing::trace!(
                pool = self.pool.as_u64(),
                task = self.task.as_u64(),
                "pool gone before task release"
            ),
        }
    }
}
