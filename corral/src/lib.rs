//! corral: concurrency coordination primitives for tokio programs.
//!
//! - [`ResourcePool`]: bounded store of reusable, disposable resources.
//! - [`WorkerPool`]: fixed set of workers fed through a rendezvous hand-off.
//! - [`BoundedRunner`]: ordered steps raced against a deadline and a stop signal.

mod error;

pub mod resource;
pub mod runner;
pub mod stats;
pub mod stop;
pub mod work;

pub use error::ConfigError;
pub use resource::{Lease, PoolError, Resource, ResourcePool};
pub use runner::{BoundedRunner, Outcome, RunnerError};
pub use stats::{PoolStats, WorkerPoolStats};
pub use stop::StopSignal;
pub use work::{SubmitError, Task, TaskFn, WorkerPool, WorkerPoolConfig, task_fn};

/// Library version, as built.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
