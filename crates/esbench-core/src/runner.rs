//! Benchmark runner.
//!
//! Tasks run one at a time in registration order. Each task is warmed up, then
//! measured until both the minimum iteration count and the measurement window
//! are satisfied. A failing iteration ends its task; the error is recorded on
//! the task and the run moves on to the next one.

use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::operation::{BenchAction, BenchOperation};
use crate::stats::TaskStats;

/// Default measurement window.
pub const DEFAULT_TIME: Duration = Duration::from_millis(500);

/// Default warm-up window.
pub const DEFAULT_WARMUP_TIME: Duration = Duration::from_millis(100);

/// Default minimum number of warm-up iterations.
pub const DEFAULT_WARMUP_ITERATIONS: usize = 5;

/// Default minimum number of measured iterations.
pub const DEFAULT_ITERATIONS: usize = 10;

/// Timing configuration for a benchmark run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunnerConfig {
    /// Minimum time spent measuring each task.
    pub time: Duration,
    /// Minimum time spent warming up each task.
    pub warmup_time: Duration,
    /// Minimum number of discarded warm-up iterations.
    pub warmup_iterations: usize,
    /// Minimum number of measured iterations.
    pub iterations: usize,
    /// Return task errors from [`Bench::run`] instead of recording them.
    pub throws: bool,
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self {
            time: DEFAULT_TIME,
            warmup_time: DEFAULT_WARMUP_TIME,
            warmup_iterations: DEFAULT_WARMUP_ITERATIONS,
            iterations: DEFAULT_ITERATIONS,
            throws: false,
        }
    }

    pub fn with_time(mut self, time: Duration) -> Self {
        self.time = time;
        self
    }

    pub fn with_warmup_time(mut self, warmup_time: Duration) -> Self {
        self.warmup_time = warmup_time;
        self
    }

    pub fn with_warmup_iterations(mut self, iterations: usize) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_throws(mut self, throws: bool) -> Self {
        self.throws = throws;
        self
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Error recorded against a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskFailure {
    pub message: String,
    pub connection_lost: bool,
}

impl From<&Error> for TaskFailure {
    fn from(e: &Error) -> Self {
        Self {
            message: e.to_string(),
            connection_lost: e.is_connection_lost(),
        }
    }
}

/// Outcome of running one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    /// `None` when no iteration completed.
    pub stats: Option<TaskStats>,
    pub error: Option<TaskFailure>,
}

impl TaskResult {
    /// Number of latency samples recorded.
    pub fn samples(&self) -> usize {
        self.stats.as_ref().map(|s| s.latency.samples).unwrap_or(0)
    }
}

/// A task's name and its result, if it ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub name: String,
    pub result: Option<TaskResult>,
}

/// A registered benchmark task.
pub struct BenchTask {
    name: String,
    action: BenchAction,
    result: Option<TaskResult>,
}

impl BenchTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }
}

/// A named set of benchmark tasks sharing one timing configuration.
pub struct Bench {
    name: String,
    config: RunnerConfig,
    tasks: Vec<BenchTask>,
}

impl Bench {
    pub fn new(name: impl Into<String>, config: RunnerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            tasks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn tasks(&self) -> &[BenchTask] {
        &self.tasks
    }

    /// Register an operation as a task.
    ///
    /// Connection-loss errors raised by the action are re-raised as
    /// [`Error::ConnectionLost`] naming the operation.
    pub fn add(&mut self, operation: BenchOperation) -> &mut Self {
        let BenchOperation { label, mut action } = operation;
        let operation_label = label.clone();
        let wrapped: BenchAction = Box::new(move || {
            let pending = action();
            let label = operation_label.clone();
            async move { pending.await.map_err(|e| tag_connection_loss(&label, e)) }.boxed()
        });
        self.tasks.push(BenchTask {
            name: label,
            action: wrapped,
            result: None,
        });
        self
    }

    /// Run every task to completion, one at a time.
    ///
    /// Broken preconditions abort the run. Other errors are recorded on their
    /// task, unless the configuration asks for them to be thrown.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(bench = %self.name, tasks = self.tasks.len(), "running benchmark");
        for task in &mut self.tasks {
            let result = run_task(task, &self.config).await?;
            if let Some(stats) = &result.stats {
                tracing::info!(
                    bench = %self.name,
                    task = %task.name,
                    samples = stats.latency.samples,
                    mean_ms = stats.latency.mean,
                    ops_per_sec = stats.throughput.mean,
                    "task finished"
                );
            }
            task.result = Some(result);
        }
        Ok(())
    }

    /// Per-task results in registration order.
    pub fn reports(&self) -> Vec<TaskReport> {
        self.tasks
            .iter()
            .map(|task| TaskReport {
                name: task.name.clone(),
                result: task.result.clone(),
            })
            .collect()
    }
}

fn tag_connection_loss(label: &str, e: Error) -> Error {
    match e {
        Error::ConnectionLost { .. } => e,
        e if e.is_connection_lost() => Error::ConnectionLost {
            operation: label.to_string(),
            message: e.to_string(),
        },
        e => e,
    }
}

async fn run_task(task: &mut BenchTask, config: &RunnerConfig) -> Result<TaskResult> {
    let mut samples = Vec::with_capacity(config.iterations);
    let mut measured = Duration::ZERO;

    let error = match measure(task, config, &mut samples, &mut measured).await {
        Ok(()) => None,
        Err(e) if e.is_precondition() || config.throws => return Err(e),
        Err(e) => {
            tracing::warn!(task = %task.name, samples = samples.len(), error = %e, "task failed");
            Some(TaskFailure::from(&e))
        }
    };

    Ok(TaskResult {
        stats: TaskStats::from_latencies(&samples, measured.as_secs_f64() * 1000.0),
        error,
    })
}

async fn measure(
    task: &mut BenchTask,
    config: &RunnerConfig,
    samples: &mut Vec<f64>,
    measured: &mut Duration,
) -> Result<()> {
    let warmup_started = Instant::now();
    let mut warmups = 0;
    while warmups < config.warmup_iterations || warmup_started.elapsed() < config.warmup_time {
        (task.action)().await?;
        warmups += 1;
    }

    let started = Instant::now();
    while samples.len() < config.iterations || started.elapsed() < config.time {
        let iteration = Instant::now();
        let outcome = (task.action)().await;
        *measured = started.elapsed();
        outcome?;
        samples.push(iteration.elapsed().as_secs_f64() * 1000.0);
    }
    Ok(())
}
