//! TaskRecordRunner port - business logic for one kind of task.
//!
//! # Responsibilities
//! - `run_task` executes a record and classifies the result. It must not
//!   delete the record; the loader does that atomically with the callbacks.
//! - `did_succeed` / `did_fail` / `did_cancel` run inside the bookkeeping
//!   write transaction. Returning `Err` there aborts the whole run, because
//!   the queue table may no longer be consistent.
//! - `did_drain_queue` runs once per run, when nothing is left to do.
//!
//! Retry limits and backoff are the runner's job: the loader retries a
//! record for as long as `run_task` keeps returning `RetryableError`.

use async_trait::async_trait;

use crate::app::TaskContext;
use crate::domain::{BoxError, TaskRecord, TaskRecordOutcome};
use crate::ports::database::WriteTx;
use crate::ports::task_store::TaskRecordStore;

pub type RecordOf<R> = <<R as TaskRecordRunner>::Store as TaskRecordStore>::Record;
pub type RecordIdOf<R> = <RecordOf<R> as TaskRecord>::Id;
pub type DbOf<R> = <<R as TaskRecordRunner>::Store as TaskRecordStore>::Db;
pub type WriteTxOf<R> = WriteTx<DbOf<R>>;

/// Error handed to `did_fail`.
pub type TaskError = dyn std::error::Error + Send + Sync;

#[async_trait]
pub trait TaskRecordRunner: Sized + Send + Sync + 'static {
    type Store: TaskRecordStore;

    fn store(&self) -> &Self::Store;

    /// Run one record.
    ///
    /// `ctx` exposes the run's cancellation signal (long-running work should
    /// poll it) and the loader itself, so a runner can stop the queue when
    /// the environment stops being suitable.
    async fn run_task(&self, record: &RecordOf<Self>, ctx: &TaskContext<Self>)
    -> TaskRecordOutcome;

    fn did_succeed(
        &self,
        record: &RecordOf<Self>,
        tx: &mut WriteTxOf<Self>,
    ) -> Result<(), BoxError>;

    fn did_fail(
        &self,
        record: &RecordOf<Self>,
        error: &TaskError,
        is_retryable: bool,
        tx: &mut WriteTxOf<Self>,
    ) -> Result<(), BoxError>;

    fn did_cancel(
        &self,
        record: &RecordOf<Self>,
        tx: &mut WriteTxOf<Self>,
    ) -> Result<(), BoxError>;

    async fn did_drain_queue(&self) {}
}
