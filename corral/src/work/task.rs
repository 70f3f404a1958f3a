//! Units of work executed by a [`WorkerPool`](super::WorkerPool).

use std::fmt;
use std::future::Future;

/// A unit of work with a single operation.
///
/// Nothing is returned to the pool: reporting failures is the task's own concern.
#[async_trait::async_trait]
pub trait Task: Send + 'static {
    async fn execute(self: Box<Self>);
}

/// Task built from a closure, see [`task_fn`].
pub struct TaskFn<F>(F);

/// Wrap a closure returning a future as a [`Task`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    TaskFn(f)
}

#[async_trait::async_trait]
impl<F, Fut> Task for TaskFn<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn execute(self: Box<Self>) {
        (self.0)().await;
    }
}

impl<F> fmt::Debug for TaskFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskFn")
    }
}
