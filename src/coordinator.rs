// src/coordinator.rs
//
// Run coordinator and worker pool.
//
// The strategy list is partitioned into one batch per worker. Each non-empty
// batch runs on its own OS thread with a dedicated single-threaded tokio
// runtime, so every store read and decode is accounted to that worker's
// thread clock. Workers report over an mpsc channel; the coordinator alone
// owns the result table.

use indicatif::{ProgressBar, ProgressStyle};
use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, error, info, trace, warn};

use crate::constants::{
    DEFAULT_FETCH_CONCURRENCY, DEFAULT_NUM_TRIALS, DEFAULT_SAMPLE_INTERVAL, PROGRESS_TEMPLATE, WORKER_THREAD_PREFIX,
};
use crate::error::{BenchError, Result};
use crate::executor::TrialExecutor;
use crate::metrics::{MetricsRow, ResultTable, TrialResult};
use crate::partition::create_batches;
use crate::profiler::{measure_cpu_time, measure_wall_time, Profiler};
use crate::store::DatasetAccessor;
use crate::strategy::StrategyDescriptor;
use crate::task::SelectionTask;

/// Knobs for one benchmark run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workers: usize,
    pub num_trials: usize,
    pub sample_interval: Duration,
    pub fetch_concurrency: usize,
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            num_trials: DEFAULT_NUM_TRIALS,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            show_progress: false,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(BenchError::Configuration("workers must be at least 1".to_string()));
        }
        if self.num_trials == 0 {
            return Err(BenchError::Configuration("num_trials must be at least 1".to_string()));
        }
        if self.sample_interval.is_zero() {
            return Err(BenchError::Configuration("sample_interval must be positive".to_string()));
        }
        Ok(())
    }
}

/// Cooperative cancellation flag, checked by workers between strategies
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initialized,
    Dispatched,
    Joining,
    Completed,
    PartiallyFailed,
    Cancelled,
}

/// A strategy that produced no row, with the reason
#[derive(Debug)]
pub struct SkippedStrategy {
    pub locator: String,
    pub error: BenchError,
}

/// Messages from workers to the coordinator
#[derive(Debug)]
enum WorkerEvent {
    Row(MetricsRow),
    Skipped(SkippedStrategy),
    Cancelled(String),
}

/// Outcome of a run
#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub table: ResultTable,
    pub skipped: Vec<SkippedStrategy>,
    pub cancelled: Vec<String>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Identities of skipped strategies in report order
    pub fn skipped_ids(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.locator.as_str()).collect()
    }
}

/// Everything a worker thread needs, owned
#[derive(Clone)]
struct WorkerContext {
    accessor: Arc<dyn DatasetAccessor>,
    options: RunOptions,
    cancel: CancellationToken,
}

pub struct RunCoordinator {
    accessor: Arc<dyn DatasetAccessor>,
    options: RunOptions,
    cancel: CancellationToken,
    state: RunState,
}

impl RunCoordinator {
    pub fn new(accessor: Arc<dyn DatasetAccessor>, options: RunOptions) -> Self {
        Self {
            accessor,
            options,
            cancel: CancellationToken::new(),
            state: RunState::Initialized,
        }
    }

    /// Token that stops the run after the strategies currently in flight
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!("Run state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Benchmark `task` against every locator. Locators whose layout label
    /// does not parse are reported as skipped without being dispatched.
    pub fn run_benchmark(&mut self, locators: &[String], task: &SelectionTask) -> Result<RunReport> {
        self.options.validate()?;
        ensure_unique(locators.iter().map(String::as_str))?;

        let mut strategies = Vec::with_capacity(locators.len());
        let mut rejected = Vec::new();
        for locator in locators {
            match StrategyDescriptor::new(locator.clone(), task.clone()) {
                Ok(s) => strategies.push(s),
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping {}: {}", locator, e);
                    rejected.push(SkippedStrategy { locator: locator.clone(), error: e });
                }
                Err(e) => return Err(e),
            }
        }
        self.execute(strategies, rejected)
    }

    /// Benchmark already-parsed strategies
    pub fn run_strategies(&mut self, strategies: Vec<StrategyDescriptor>) -> Result<RunReport> {
        self.execute(strategies, Vec::new())
    }

    fn execute(&mut self, strategies: Vec<StrategyDescriptor>, rejected: Vec<SkippedStrategy>) -> Result<RunReport> {
        let started = Instant::now();
        self.options.validate()?;
        ensure_unique(strategies.iter().map(StrategyDescriptor::id))?;

        let workers = self.options.workers;
        info!(
            "Starting benchmark of {} strategies on {} workers ({} trials each)",
            strategies.len(),
            workers,
            self.options.num_trials
        );

        let batches = create_batches(&strategies, workers)?;
        let progress = self.progress_bar(strategies.len() as u64)?;

        let (tx, rx) = mpsc::channel::<WorkerEvent>();
        let mut handles = Vec::new();
        for (worker_id, batch) in batches.into_iter().enumerate() {
            if batch.is_empty() {
                debug!("Worker {} has an empty batch, not spawned", worker_id);
                continue;
            }
            let ctx = WorkerContext {
                accessor: Arc::clone(&self.accessor),
                options: self.options.clone(),
                cancel: self.cancel.clone(),
            };
            let tx = tx.clone();
            debug!("Spawning worker {} with {} strategies", worker_id, batch.len());
            let handle = thread::Builder::new()
                .name(format!("{}-{}", WORKER_THREAD_PREFIX, worker_id))
                .spawn(move || run_worker(worker_id, batch, ctx, tx))
                .map_err(|e| BenchError::PartitionJoin {
                    worker_id,
                    reason: format!("cannot spawn thread: {}", e),
                })?;
            handles.push((worker_id, handle));
        }
        // Channel closes once every worker has dropped its sender
        drop(tx);
        self.transition(RunState::Dispatched);

        self.transition(RunState::Joining);
        let mut table = ResultTable::new();
        let mut skipped = rejected;
        let mut cancelled = Vec::new();
        for event in rx {
            match event {
                WorkerEvent::Row(row) => {
                    progress.set_message(row.locator.clone());
                    table.insert(row)?;
                }
                WorkerEvent::Skipped(skip) => {
                    progress.set_message(format!("skipped {}", skip.locator));
                    skipped.push(skip);
                }
                WorkerEvent::Cancelled(locator) => cancelled.push(locator),
            }
            progress.inc(1);
        }

        let mut join_error = None;
        for (worker_id, handle) in handles {
            let failure = match handle.join() {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };
            error!("Worker {} failed: {}", worker_id, failure);
            join_error.get_or_insert(BenchError::PartitionJoin { worker_id, reason: failure });
        }
        if let Some(e) = join_error {
            progress.abandon_with_message("worker failure");
            return Err(e);
        }

        let state = if !cancelled.is_empty() {
            RunState::Cancelled
        } else if !skipped.is_empty() {
            RunState::PartiallyFailed
        } else {
            RunState::Completed
        };
        self.transition(state);
        progress.finish_with_message(format!("{} rows, {} skipped", table.len(), skipped.len()));

        let elapsed = started.elapsed();
        info!(
            "Benchmark finished in {:.2}s: {} rows, {} skipped, {} cancelled",
            elapsed.as_secs_f64(),
            table.len(),
            skipped.len(),
            cancelled.len()
        );
        Ok(RunReport { state, table, skipped, cancelled, elapsed })
    }

    fn progress_bar(&self, total: u64) -> Result<ProgressBar> {
        if !self.options.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::with_template(PROGRESS_TEMPLATE)
                .map_err(|e| BenchError::Configuration(format!("progress template: {}", e)))?,
        );
        pb.set_message(format!("{} workers", self.options.workers));
        Ok(pb)
    }
}

fn ensure_unique<'a>(ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(BenchError::Configuration(format!("duplicate strategy '{}'", id)));
        }
    }
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Body of one worker thread: run the batch sequentially, one event per strategy
fn run_worker(
    worker_id: usize,
    batch: Vec<StrategyDescriptor>,
    ctx: WorkerContext,
    tx: mpsc::Sender<WorkerEvent>,
) -> Result<()> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| BenchError::Configuration(format!("cannot build worker runtime: {}", e)))?;
    info!("Worker {} started with {} strategies", worker_id, batch.len());

    for (pos, strategy) in batch.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            info!("Worker {} cancelled, {} strategies not run", worker_id, batch.len() - pos);
            for rest in &batch[pos..] {
                let _ = tx.send(WorkerEvent::Cancelled(rest.locator.clone()));
            }
            break;
        }

        let event = match measure_strategy(&runtime, &ctx, strategy) {
            Ok(row) => {
                debug!("Worker {} finished {}", worker_id, strategy.id());
                WorkerEvent::Row(row)
            }
            Err(e) if e.is_recoverable() => {
                warn!("Worker {} skipping {}: {}", worker_id, strategy.id(), e);
                WorkerEvent::Skipped(SkippedStrategy { locator: strategy.locator.clone(), error: e })
            }
            Err(e) => return Err(e),
        };
        if tx.send(event).is_err() {
            warn!("Worker {}: coordinator stopped listening", worker_id);
            break;
        }
    }
    Ok(())
}

/// Open the strategy's store and run every trial against it.
///
/// Each trial executes the task three times: under the CPU clock, under the
/// wall clock, and under the memory sampler. The last execution's result
/// feeds the chunk metrics.
fn measure_strategy(runtime: &Runtime, ctx: &WorkerContext, strategy: &StrategyDescriptor) -> Result<MetricsRow> {
    let store = runtime.block_on(ctx.accessor.open(strategy))?;
    let executor = TrialExecutor::new(ctx.options.fetch_concurrency);
    let profiler = Profiler::new(ctx.options.sample_interval);
    let run = || runtime.block_on(executor.execute(store.as_ref(), &strategy.task));

    let mut trials = Vec::with_capacity(ctx.options.num_trials);
    for trial in 0..ctx.options.num_trials {
        let (_, cpu) = measure_cpu_time(&run)?;
        let (_, wall) = measure_wall_time(&run)?;
        let (execution, peak_mib) = profiler.measure_peak_memory(&run)?;
        let result = TrialResult::derive(&execution, cpu, wall, peak_mib)?;
        trace!(
            "{} trial {}: cpu {:.4}s wall {:.4}s peak {:.1} MiB",
            strategy.id(),
            trial,
            result.cpu_time_secs,
            result.wall_time_secs,
            result.peak_memory_mib
        );
        trials.push(result);
    }
    Ok(MetricsRow::from_trials(strategy, &trials)?.with_archive_size(store.archive_bytes()?))
}
