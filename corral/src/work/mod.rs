//! Fixed-size worker pool with rendezvous hand-off.
//!
//! `submit` returns once a worker has taken the task, not once it has run.
//! With every worker busy, submitters wait: at most N tasks execute at once
//! and nothing queues behind them.

mod pool;
mod task;

pub use pool::{SubmitError, WorkerPool, WorkerPoolConfig};
pub use task::{Task, TaskFn, task_fn};
