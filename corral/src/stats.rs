//! Point-in-time pool snapshots.

use serde::{Deserialize, Serialize};

/// Snapshot of a [`ResourcePool`](crate::ResourcePool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Maximum number of idle resources.
    pub capacity: usize,
    /// Resources currently idle in the pool.
    pub idle: usize,
    /// Resources the factory has produced.
    pub created: u64,
    /// Resources the pool has disposed.
    pub disposed: u64,
    /// Created resources neither idle nor disposed.
    pub in_use: u64,
    pub closed: bool,
}

/// Snapshot of a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolStats {
    pub name: String,
    pub workers: usize,
    /// Workers currently executing a task.
    pub busy: usize,
    /// Tasks finished, including ones that panicked.
    pub completed: u64,
    pub shut_down: bool,
}

impl WorkerPoolStats {
    pub fn idle(&self) -> usize {
        self.workers.saturating_sub(self.busy)
    }
}
