//! Worker pool implementation.
//!
//! There is no task queue. Each idle worker posts a one-shot *offer* on a
//! shared ready channel and parks on it; `submit` waits for an offer and
//! fills it. A submitter that gives up before finding an offer leaves nothing
//! behind, and an offer is filled without an await in between, so a task is
//! either handed to a worker or returned to nobody.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Task;
use crate::error::ConfigError;
use crate::stats::WorkerPoolStats;

/// An idle worker waiting for exactly one task.
type Offer = oneshot::Sender<Box<dyn Task>>;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub num_workers: usize,
    /// Used in log events and stats.
    pub name: String,
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            name: "workers".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("worker pool has been shut down")]
    ShutDown,
}

#[derive(Default)]
struct Counters {
    busy: AtomicUsize,
    completed: AtomicU64,
}

/// Pool of N long-lived workers.
pub struct WorkerPool {
    name: String,
    num_workers: usize,
    ready_rx: tokio::sync::Mutex<mpsc::Receiver<Offer>>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Spawn the workers. Must be called from within a tokio runtime.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, ConfigError> {
        if config.num_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }

        // Each worker has at most one outstanding offer, so posting never waits.
        let (ready_tx, ready_rx) = mpsc::channel::<Offer>(config.num_workers);
        let shutdown = CancellationToken::new();
        let counters = Arc::new(Counters::default());

        let workers = (0..config.num_workers)
            .map(|index| {
                tokio::spawn(worker_loop(
                    config.name.clone(),
                    index,
                    ready_tx.clone(),
                    shutdown.clone(),
                    Arc::clone(&counters),
                ))
            })
            .collect();

        tracing::info!(pool = %config.name, num_workers = config.num_workers, "Worker pool started");

        Ok(Self {
            name: config.name,
            num_workers: config.num_workers,
            ready_rx: tokio::sync::Mutex::new(ready_rx),
            shutdown,
            workers: Mutex::new(workers),
            counters,
        })
    }

    /// Hand a task to the next free worker.
    ///
    /// Waits while every worker is busy and returns once a worker has taken
    /// ownership of the task; execution may still be in progress. Dropping the
    /// returned future before it completes discards the task.
    pub async fn submit<T: Task>(&self, task: T) -> Result<(), SubmitError> {
        self.submit_boxed(Box::new(task)).await
    }

    pub async fn submit_boxed(&self, mut task: Box<dyn Task>) -> Result<(), SubmitError> {
        loop {
            let offer = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => return Err(SubmitError::ShutDown),
                offer = async { self.ready_rx.lock().await.recv().await } => offer,
            };

            let Some(offer) = offer else {
                return Err(SubmitError::ShutDown);
            };
            if self.shutdown.is_cancelled() {
                return Err(SubmitError::ShutDown);
            }

            self.counters.busy.fetch_add(1, Ordering::AcqRel);
            match offer.send(task) {
                Ok(()) => return Ok(()),
                // The worker left during shutdown; its offer was stale.
                Err(returned) => {
                    self.counters.busy.fetch_sub(1, Ordering::AcqRel);
                    task = returned;
                }
            }
        }
    }

    /// Stop accepting tasks and wait for every worker to finish its current
    /// task and exit. Later calls return immediately.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            tracing::debug!(pool = %self.name, "Worker pool already shut down");
        }
        self.shutdown.cancel();

        let workers = std::mem::take(&mut *lock(&self.workers));
        for (index, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                tracing::error!(pool = %self.name, worker = index, error = %e, "Worker task failed");
            }
        }

        tracing::info!(
            pool = %self.name,
            completed = self.counters.completed.load(Ordering::Acquire),
            "Worker pool shut down"
        );
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            name: self.name.clone(),
            workers: self.num_workers,
            busy: self.counters.busy.load(Ordering::Acquire),
            completed: self.counters.completed.load(Ordering::Acquire),
            shut_down: self.is_shut_down(),
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("num_workers", &self.num_workers)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

async fn worker_loop(
    pool: String,
    index: usize,
    ready: mpsc::Sender<Offer>,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
) {
    tracing::trace!(%pool, worker = index, "Worker waiting for tasks");

    loop {
        let (offer, mut taken) = oneshot::channel();
        if ready.send(offer).await.is_err() {
            // Pool dropped.
            break;
        }

        let task = tokio::select! {
            biased;

            task = &mut taken => match task {
                Ok(task) => task,
                Err(_) => break,
            },
            _ = shutdown.cancelled() => {
                // A submitter may have filled the offer just as shutdown began.
                taken.close();
                match taken.try_recv() {
                    Ok(task) => task,
                    Err(_) => break,
                }
            }
        };

        let outcome = AssertUnwindSafe(task.execute()).catch_unwind().await;

        counters.busy.fetch_sub(1, Ordering::AcqRel);
        counters.completed.fetch_add(1, Ordering::AcqRel);

        if outcome.is_err() {
            tracing::error!(%pool, worker = index, "Task panicked; worker continues");
        }
        if shutdown.is_cancelled() {
            break;
        }
    }

    tracing::debug!(%pool, worker = index, "Worker exiting");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
