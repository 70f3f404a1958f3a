//! Deadline-bound sequential runner.
//!
//! A [`BoundedRunner`] runs its steps one after another on a background task
//! and races that task against a deadline fixed when the runner was built:
//! - all steps finish first: `Ok(())`
//! - the deadline passes first: [`RunnerError::TimedOut`]
//! - a stop is observed between steps: [`RunnerError::Interrupted`]
//!
//! On timeout the background task is abandoned, not aborted. Steps that are
//! already running keep running, and the remaining steps still execute in
//! order after `start` has returned, unless a stop is requested.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::stop::StopSignal;

type Step = Box<dyn FnOnce(usize) -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    #[error("received timeout")]
    TimedOut,
    #[error("received interrupt")]
    Interrupted,
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    TimedOut,
    Interrupted,
}

impl Outcome {
    /// Conventional process exit code: 0 completed, 1 timed out, 2 interrupted.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::TimedOut => 1,
            Self::Interrupted => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Interrupted => "interrupted",
        }
    }
}

impl From<&Result<(), RunnerError>> for Outcome {
    fn from(result: &Result<(), RunnerError>) -> Self {
        match result {
            Ok(()) => Self::Completed,
            Err(RunnerError::TimedOut) => Self::TimedOut,
            Err(RunnerError::Interrupted) => Self::Interrupted,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs an ordered list of steps under a deadline and a stop signal.
pub struct BoundedRunner {
    deadline: Instant,
    stop: StopSignal,
    listen_for_interrupt: bool,
    steps: Vec<Step>,
}

impl BoundedRunner {
    /// Create a runner whose deadline is `timeout` from now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            stop: StopSignal::new(),
            listen_for_interrupt: true,
            steps: Vec::new(),
        }
    }

    /// Use a caller-owned stop signal instead of a private one.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Whether `start` feeds process interrupts into the stop signal (default: true).
    pub fn with_interrupt_listener(mut self, enabled: bool) -> Self {
        self.listen_for_interrupt = enabled;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Append an async step. It receives its 0-based position.
    pub fn add<F, Fut>(&mut self, step: F) -> &mut Self
    where
        F: FnOnce(usize) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.steps.push(Box::new(move |id| step(id).boxed()));
        self
    }

    /// Append a blocking step, run on tokio's blocking thread pool.
    pub fn add_blocking<F>(&mut self, step: F) -> &mut Self
    where
        F: FnOnce(usize) + Send + 'static,
    {
        self.steps.push(Box::new(move |id| {
            async move {
                if let Err(e) = tokio::task::spawn_blocking(move || step(id)).await
                    && e.is_panic()
                {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
            .boxed()
        }));
        self
    }

    pub fn add_steps<I, F, Fut>(&mut self, steps: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(usize) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        for step in steps {
            self.add(step);
        }
        self
    }

    /// Run every step and wait for completion or the deadline, whichever is first.
    ///
    /// A panicking step propagates its panic out of this call.
    pub async fn start(self) -> Result<(), RunnerError> {
        let Self {
            deadline,
            stop,
            listen_for_interrupt,
            steps,
        } = self;

        if listen_for_interrupt {
            stop.listen_for_interrupt();
        }

        tracing::debug!(steps = steps.len(), "Runner starting");
        let run = tokio::spawn(run_steps(steps, stop.clone()));

        let result = tokio::select! {
            biased;

            joined = run => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    stop.stop_listening();
                    std::panic::resume_unwind(e.into_panic());
                }
                // Only happens when the runtime is shutting down underneath us.
                Err(_) => Err(RunnerError::Interrupted),
            },

            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!("Runner deadline elapsed, abandoning remaining steps");
                Err(RunnerError::TimedOut)
            }
        };

        stop.stop_listening();
        tracing::debug!(outcome = %Outcome::from(&result), "Runner finished");
        result
    }
}

impl fmt::Debug for BoundedRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedRunner")
            .field("deadline", &self.deadline)
            .field("steps", &self.steps.len())
            .field("listen_for_interrupt", &self.listen_for_interrupt)
            .finish_non_exhaustive()
    }
}

async fn run_steps(steps: Vec<Step>, stop: StopSignal) -> Result<(), RunnerError> {
    for (id, step) in steps.into_iter().enumerate() {
        if stop.is_stop_requested() {
            stop.stop_listening();
            tracing::info!(step = id, "Stop requested, skipping remaining steps");
            return Err(RunnerError::Interrupted);
        }

        tracing::trace!(step = id, "Running step");
        step(id).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn quiet_runner(timeout: Duration) -> BoundedRunner {
        BoundedRunner::new(timeout).with_interrupt_listener(false)
    }

    fn recording_step(
        log: &Arc<Mutex<Vec<usize>>>,
        work: Duration,
    ) -> impl FnOnce(usize) -> BoxFuture<'static, ()> + Send + use<> {
        let log = Arc::clone(log);
        move |id| {
            async move {
                tokio::time::sleep(work).await;
                log.lock().unwrap().push(id);
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_every_step_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut runner = quiet_runner(Duration::from_secs(5));
        for _ in 0..5 {
            runner.add(recording_step(&log, Duration::from_millis(10)));
        }
        assert_eq!(runner.len(), 5);

        assert_eq!(runner.start().await, Ok(()));
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_runner_completes() {
        let runner = quiet_runner(Duration::from_secs(1));
        assert!(runner.is_empty());
        assert_eq!(runner.start().await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_at_deadline_and_abandons_remaining_steps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut runner = quiet_runner(Duration::from_millis(2500));
        runner.add_steps((0..5).map(|_| recording_step(&log, Duration::from_secs(1))));

        let started = Instant::now();
        assert_eq!(runner.start().await, Err(RunnerError::TimedOut));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(2500));
        assert!(elapsed < Duration::from_secs(3), "returned late: {elapsed:?}");
        assert_eq!(*log.lock().unwrap(), vec![0, 1]);

        // The abandoned run is not cancelled: it keeps going after start() returned.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_fixed_at_construction() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut runner = quiet_runner(Duration::from_secs(1));
        let counter = Arc::clone(&ran);
        runner.add(move |_| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Time spent before start counts against the deadline.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runner.start().await, Err(RunnerError::TimedOut));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_step_skips_it_and_everything_after() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut runner = quiet_runner(Duration::from_secs(60));
        let stop = runner.stop_signal();

        runner.add(recording_step(&log, Duration::from_millis(10)));
        {
            let log = Arc::clone(&log);
            runner.add(move |id| async move {
                log.lock().unwrap().push(id);
                stop.request_stop();
            });
        }
        for _ in 0..3 {
            runner.add(recording_step(&log, Duration::from_millis(10)));
        }

        assert_eq!(runner.start().await, Err(RunnerError::Interrupted));
        assert_eq!(*log.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_requested_before_start_runs_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stop = StopSignal::new();
        let mut runner = quiet_runner(Duration::from_secs(1)).with_stop_signal(stop.clone());
        runner.add(recording_step(&log, Duration::ZERO));

        stop.request_stop();
        assert_eq!(runner.start().await, Err(RunnerError::Interrupted));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn step_in_progress_is_not_interrupted() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut runner = quiet_runner(Duration::from_secs(60));
        let stop = runner.stop_signal();

        {
            let log = Arc::clone(&log);
            runner.add(move |id| async move {
                stop.request_stop();
                tokio::time::sleep(Duration::from_secs(1)).await;
                log.lock().unwrap().push(id);
            });
        }
        runner.add(recording_step(&log, Duration::ZERO));

        assert_eq!(runner.start().await, Err(RunnerError::Interrupted));
        assert_eq!(*log.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn blocking_steps_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut runner = quiet_runner(Duration::from_secs(10));
        for _ in 0..3 {
            let log = Arc::clone(&log);
            runner.add_blocking(move |id| {
                std::thread::sleep(Duration::from_millis(5));
                log.lock().unwrap().push(id);
            });
        }

        assert_eq!(runner.start().await, Ok(()));
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    #[should_panic(expected = "step exploded")]
    async fn panicking_step_propagates() {
        let mut runner = quiet_runner(Duration::from_secs(10));
        runner.add(|_| async {
            panic!("step exploded");
        });
        let _ = runner.start().await;
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_listener_is_removed_after_start() {
        let mut runner = BoundedRunner::new(Duration::from_secs(1));
        let stop = runner.stop_signal();
        runner.add(|_| async {});

        assert_eq!(runner.start().await, Ok(()));
        assert!(!stop.is_listening());
    }

    #[test]
    fn outcome_maps_results_and_exit_codes() {
        let cases = [
            (Ok(()), Outcome::Completed, 0),
            (Err(RunnerError::TimedOut), Outcome::TimedOut, 1),
            (Err(RunnerError::Interrupted), Outcome::Interrupted, 2),
        ];
        for (result, outcome, code) in cases {
            assert_eq!(Outcome::from(&result), outcome);
            assert_eq!(outcome.exit_code(), code);
        }
    }

    #[test]
    fn outcome_serializes_snake_case() {
        insta::assert_json_snapshot!(
            [Outcome::Completed, Outcome::TimedOut, Outcome::Interrupted],
            @r#"
        [
          "completed",
          "timed_out",
          "interrupted"
        ]
        "#
        );
    }

    #[test]
    fn runner_error_messages() {
        assert_eq!(RunnerError::TimedOut.to_string(), "received timeout");
        assert_eq!(RunnerError::Interrupted.to_string(), "received interrupt");
    }
}
