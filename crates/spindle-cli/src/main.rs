//! spindle - in-memory demo of the task queue loader.
//!
//! Enqueues `--records` synthetic tasks, runs them through a
//! `TaskQueueLoader` and prints a JSON summary.
//!
//! ```text
//! spindle --records 50 --concurrency 8 --fail-every 10 --flaky-every 7
//! RUST_LOG=spindle_core=debug spindle --records 5
//! ```

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use spindle_core::app::load_json_file;
use spindle_core::impls::{InMemoryDatabase, InMemoryTaskStore, QueuedTask, TaskTable};
use spindle_core::ports::TaskError;
use spindle_core::{
    BoxError, Clock, Database, LoaderConfig, RetryPolicy, SystemClock, TaskContext,
    TaskQueueLoader, TaskRecordOutcome, TaskRecordRunner, TaskRecordStore,
};

#[derive(Debug, Parser)]
#[command(name = "spindle", about = "Run synthetic tasks through a bounded-concurrency task queue")]
struct Args {
    /// Number of tasks to enqueue.
    #[arg(long, default_value_t = 20)]
    records: u64,

    /// Overrides `loader.max_concurrent_tasks` from the config file.
    #[arg(long)]
    concurrency: Option<NonZeroUsize>,

    /// JSON config file (`loader`, `retry`, `max_attempts`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Every Nth task fails permanently.
    #[arg(long)]
    fail_every: Option<u64>,

    /// Every Nth task fails twice with a retryable error before succeeding.
    #[arg(long)]
    flaky_every: Option<u64>,

    /// Simulated work per task.
    #[arg(long, default_value_t = 50)]
    work_ms: u64,

    /// Overrides `max_attempts` from the config file.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Debug logging (ignored when RUST_LOG is set).
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct CliConfig {
    loader: LoaderConfig,
    retry: RetryPolicy,
    /// Retryable failures after which the demo runner gives up on a task.
    max_attempts: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            loader: LoaderConfig::new("spindle-demo"),
            retry: RetryPolicy {
                base_delay_ms: 100,
                ..RetryPolicy::default()
            },
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    succeeded: u64,
    failed: u64,
    gave_up: u64,
    retries: u64,
    cancelled: u64,
}

/// Fails according to the record id; everything else succeeds after `work`.
struct DemoRunner {
    store: InMemoryTaskStore,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    max_attempts: u32,
    fail_every: Option<u64>,
    flaky_every: Option<u64>,
    work: Duration,
    summary: Mutex<Summary>,
}

impl DemoRunner {
    /// Tally an outcome. Callbacks call this last, right before `Ok(())`:
    /// the callback is the final step of the loader's bookkeeping write, so
    /// a tally is only taken when the transaction commits.
    fn count(&self, f: impl FnOnce(&mut Summary)) {
        if let Ok(mut summary) = self.summary.lock() {
            f(&mut summary);
        }
    }
}

fn nth(every: Option<u64>, id: u64) -> bool {
    every.is_some_and(|n| n > 0 && (id + 1) % n == 0)
}

#[async_trait]
impl TaskRecordRunner for DemoRunner {
    type Store = InMemoryTaskStore;

    fn store(&self) -> &InMemoryTaskStore {
        &self.store
    }

    async fn run_task(&self, record: &QueuedTask, ctx: &TaskContext<Self>) -> TaskRecordOutcome {
        debug!(id = record.id, attempts = record.attempts, payload = %record.payload, "working");
        tokio::select! {
            _ = tokio::time::sleep(self.work) => {}
            _ = ctx.cancelled() => return TaskRecordOutcome::Cancelled,
        }

        if nth(self.fail_every, record.id) {
            TaskRecordOutcome::unretryable(format!("task {} rejected its payload", record.id))
        } else if nth(self.flaky_every, record.id) && record.attempts < 2 {
            TaskRecordOutcome::retryable(format!("task {} hit a transient error", record.id))
        } else {
            TaskRecordOutcome::Success
        }
    }

    fn did_succeed(&self, _record: &QueuedTask, _tx: &mut TaskTable) -> Result<(), BoxError> {
        self.count(|s| s.succeeded += 1);
        Ok(())
    }

    fn did_fail(
        &self,
        record: &QueuedTask,
        error: &TaskError,
        is_retryable: bool,
        tx: &mut TaskTable,
    ) -> Result<(), BoxError> {
        if !is_retryable {
            self.count(|s| s.failed += 1);
            return Ok(());
        }

        let Some(row) = tx.get_mut(record.id) else {
            return Err(format!("task {} disappeared before its retry was recorded", record.id).into());
        };
        row.attempts += 1;

        if row.attempts >= self.max_attempts {
            warn!(id = record.id, attempts = row.attempts, %error, "giving up");
            self.store.remove_record(record, tx)?;
            self.count(|s| s.gave_up += 1);
        } else {
            let at = self.retry.next_retry_timestamp(self.clock.now_millis(), row.attempts);
            row.next_retry_timestamp = Some(at);
            self.count(|s| s.retries += 1);
        }
        Ok(())
    }

    fn did_cancel(&self, _record: &QueuedTask, _tx: &mut TaskTable) -> Result<(), BoxError> {
        self.count(|s| s.cancelled += 1);
        Ok(())
    }

    async fn did_drain_queue(&self) {
        info!("queue drained");
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(args: &Args) -> Result<CliConfig, BoxError> {
    let mut config: CliConfig = match &args.config {
        Some(path) => load_json_file(path)?,
        None => CliConfig::default(),
    };
    if let Some(concurrency) = args.concurrency {
        config.loader.max_concurrent_tasks = concurrency;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let config = load_config(&args)?;

    // (A) seed the in-memory table
    let mut table = TaskTable::new();
    for n in 0..args.records {
        table.enqueue(serde_json::json!({ "n": n }));
    }
    let db = Arc::new(InMemoryDatabase::new(table));

    // (B) runner and loader
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let runner = DemoRunner {
        store: InMemoryTaskStore,
        clock: Arc::clone(&clock),
        retry: config.retry.clone(),
        max_attempts: config.max_attempts,
        fail_every: args.fail_every,
        flaky_every: args.flaky_every,
        work: Duration::from_millis(args.work_ms),
        summary: Mutex::new(Summary::default()),
    };
    let loader = TaskQueueLoader::new(config.loader.clone(), clock, Arc::clone(&db), runner);
    info!(
        records = args.records,
        max_concurrent_tasks = loader.max_concurrent_tasks(),
        "starting"
    );

    // (C) wait for the drain; Ctrl-C stops with a reason
    let started = Instant::now();
    let run = loader.load_and_run_tasks();
    tokio::pin!(run);
    let result = tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            loader.stop_with_reason("interrupted");
            run.await
        }
    };

    // (D) JSON report
    let summary = match loader.runner().summary.lock() {
        Ok(summary) => serde_json::to_value(&*summary)?,
        Err(_) => serde_json::Value::Null,
    };
    let report = serde_json::json!({
        "name": config.loader.name,
        "records": args.records,
        "max_concurrent_tasks": loader.max_concurrent_tasks(),
        "status": loader.status(),
        "remaining": db.read(|table| table.len()),
        "elapsed_ms": started.elapsed().as_millis() as u64,
        "result": match &result {
            Ok(()) => "drained".to_string(),
            Err(err) => err.to_string(),
        },
        "summary": summary,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    result.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nth_counts_from_one() {
        assert!(!nth(Some(3), 0));
        assert!(nth(Some(3), 2));
        assert!(nth(Some(3), 5));
        assert!(!nth(None, 2));
        assert!(!nth(Some(0), 2));
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from([
            "spindle",
            "--records",
            "5",
            "--concurrency",
            "2",
            "--fail-every",
            "3",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.records, 5);
        assert_eq!(args.concurrency.map(NonZeroUsize::get), Some(2));
        assert_eq!(args.fail_every, Some(3));
        assert!(args.verbose);
        assert!(Args::try_parse_from(["spindle", "--concurrency", "0"]).is_err());
    }

    #[test]
    fn config_file_is_partial() {
        let config: CliConfig =
            serde_json::from_str(r#"{"loader": {"max_concurrent_tasks": 2}, "max_attempts": 3}"#)
                .unwrap();
        assert_eq!(config.loader.max_concurrent_tasks.get(), 2);
        assert_eq!(config.loader.name, "task-queue");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry, CliConfig::default().retry);
    }

    fn idle_runner(max_attempts: u32) -> DemoRunner {
        DemoRunner {
            store: InMemoryTaskStore,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
            max_attempts,
            fail_every: None,
            flaky_every: None,
            work: Duration::ZERO,
            summary: Mutex::new(Summary::default()),
        }
    }

    #[test]
    fn rejected_bookkeeping_leaves_the_summary_alone() {
        let runner = idle_runner(3);
        let missing = QueuedTask {
            id: 9,
            payload: serde_json::Value::Null,
            attempts: 0,
            next_retry_timestamp: None,
        };
        let error: BoxError = "flaky".into();

        let mut table = TaskTable::new();
        let result = runner.did_fail(&missing, error.as_ref(), true, &mut table);

        assert!(result.is_err());
        let summary = runner.summary.lock().unwrap();
        assert_eq!((summary.retries, summary.gave_up, summary.failed), (0, 0, 0));
    }

    #[test]
    fn retry_is_counted_with_the_row_update() {
        let runner = idle_runner(3);
        let mut table = TaskTable::new();
        let id = table.enqueue(serde_json::json!("x"));
        let record = table.get(id).cloned().unwrap();
        let error: BoxError = "flaky".into();

        runner.did_fail(&record, error.as_ref(), true, &mut table).unwrap();

        let row = table.get(id).unwrap();
        assert_eq!(row.attempts, 1);
        assert!(row.next_retry_timestamp.is_some());
        assert_eq!(runner.summary.lock().unwrap().retries, 1);
    }

    #[tokio::test]
    async fn demo_runner_retries_then_gives_up() {
        let mut table = TaskTable::new();
        for n in 0..6 {
            table.enqueue(serde_json::json!(n));
        }
        let db = Arc::new(InMemoryDatabase::new(table));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let runner = DemoRunner {
            store: InMemoryTaskStore,
            clock: Arc::clone(&clock),
            retry: RetryPolicy {
                base_delay_ms: 1,
                max_delay_ms: 1,
                ..RetryPolicy::default()
            },
            // the flaky task needs 3 attempts; give up after 2
            max_attempts: 2,
            fail_every: Some(3),
            flaky_every: Some(5),
            work: Duration::ZERO,
            summary: Mutex::new(Summary::default()),
        };
        let loader = TaskQueueLoader::new(LoaderConfig::default(), clock, Arc::clone(&db), runner);

        loader.load_and_run_tasks().await.unwrap();

        let summary = loader.runner().summary.lock().unwrap();
        // ids 2 and 5 fail, id 4 is flaky
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.retries, 1);
        assert_eq!(summary.gave_up, 1);
        assert_eq!(summary.succeeded, 3);
        assert!(db.snapshot().is_empty());
    }
}
