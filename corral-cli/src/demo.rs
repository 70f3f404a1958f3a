//! Demo scenarios for each primitive.
//!
//! Reports go to stdout as JSON; progress is logged through tracing on stderr.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use corral::{BoundedRunner, Outcome, Resource, ResourcePool, WorkerPool, WorkerPoolConfig, task_fn};
use serde::Serialize;

use crate::Command;

const NAMES: [&str; 5] = ["steve", "bob", "mary", "therese", "jason"];

/// Run a command and return the process exit code.
pub async fn run(command: Command) -> anyhow::Result<i32> {
    match command {
        Command::Run { timeout, steps } => run_steps(timeout, steps).await,
        Command::Pool {
            capacity,
            clients,
            rounds,
        } => share_pool(capacity, clients, rounds).await,
        Command::Work { workers, items } => hand_off_work(workers, items).await,
        Command::Version => {
            print_json(&VersionReport::current())?;
            Ok(0)
        }
    }
}

/// Versions of the binary and of the library it was linked against.
#[derive(Debug, Serialize)]
struct VersionReport {
    corral_cli: &'static str,
    corral: &'static str,
}

impl VersionReport {
    fn current() -> Self {
        Self {
            corral_cli: env!("CARGO_PKG_VERSION"),
            corral: corral::VERSION,
        }
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    outcome: Outcome,
    steps: usize,
    timeout_secs: f64,
    started_at: String,
    finished_at: String,
}

async fn run_steps(timeout: Duration, steps: usize) -> anyhow::Result<i32> {
    tracing::info!(?timeout, steps, "Starting work");
    let started_at = chrono::Utc::now().to_rfc3339();

    let mut runner = BoundedRunner::new(timeout);
    for _ in 0..steps {
        // Step N takes N seconds.
        runner.add(|id| async move {
            tracing::info!(step = id, "Processing step");
            tokio::time::sleep(Duration::from_secs(id as u64)).await;
        });
    }

    let result = runner.start().await;
    let outcome = Outcome::from(&result);
    match outcome {
        Outcome::Completed => tracing::info!("Process ended"),
        Outcome::TimedOut => tracing::warn!("Terminating due to timeout"),
        Outcome::Interrupted => tracing::warn!("Terminating due to interrupt"),
    }

    print_json(&RunReport {
        outcome,
        steps,
        timeout_secs: timeout.as_secs_f64(),
        started_at,
        finished_at: chrono::Utc::now().to_rfc3339(),
    })?;
    Ok(outcome.exit_code())
}

/// Stand-in for a database connection.
#[derive(Debug)]
struct DemoConnection {
    id: usize,
}

impl Resource for DemoConnection {
    type Error = Infallible;

    fn close(self) -> Result<(), Infallible> {
        tracing::info!(connection = self.id, "Close: connection");
        Ok(())
    }
}

async fn share_pool(capacity: usize, clients: usize, rounds: usize) -> anyhow::Result<i32> {
    let next_id = AtomicUsize::new(1);
    let pool = ResourcePool::new(capacity, move || {
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(connection = id, "Create: new connection");
        Ok::<_, Infallible>(DemoConnection { id })
    })
    .context("failed to create resource pool")?;
    let pool = Arc::new(pool);

    for round in 0..rounds {
        let queries: Vec<_> = (0..clients)
            .map(|query| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    let conn = pool.acquire()?;
                    // Vary the hold time so clients overlap unevenly.
                    tokio::time::sleep(Duration::from_millis(10 * (query as u64 % 4 + 1))).await;
                    tracing::info!(round, query, connection = conn.id, "Query done");
                    pool.release(conn);
                    anyhow::Ok(())
                })
            })
            .collect();

        for query in queries {
            query.await.context("query task failed")??;
        }
    }

    pool.close();
    print_json(&pool.stats())?;
    Ok(0)
}

async fn hand_off_work(workers: usize, items: usize) -> anyhow::Result<i32> {
    let pool = WorkerPool::new(WorkerPoolConfig::new(workers).with_name("names"))
        .context("failed to start worker pool")?;
    let pool = Arc::new(pool);

    let submitters: Vec<_> = (0..items)
        .map(|item| {
            let pool = Arc::clone(&pool);
            let name = NAMES[item % NAMES.len()];
            tokio::spawn(async move {
                pool.submit(task_fn(move || async move {
                    tracing::info!(item, name, "Printing name");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }))
                .await
            })
        })
        .collect();

    for submitter in submitters {
        submitter.await.context("submit task failed")??;
    }

    pool.shutdown().await;
    print_json(&pool.stats())?;
    Ok(0)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("JSON serialization failed")?;
    println!("{json}");
    Ok(())
}
