//! Per-task view of the running loader.

use tokio_util::sync::CancellationToken;

use crate::app::TaskQueueLoader;
use crate::domain::RunId;
use crate::ports::TaskRecordRunner;

/// Handed to `TaskRecordRunner::run_task`.
///
/// Cancellation is cooperative: the loader never aborts a running task, it
/// only fires this token. Work that can take a while should check
/// `is_cancelled` or race `cancelled()`.
pub struct TaskContext<R: TaskRecordRunner> {
    loader: TaskQueueLoader<R>,
    run_id: RunId,
    cancel: CancellationToken,
}

impl<R: TaskRecordRunner> TaskContext<R> {
    pub(crate) fn new(loader: TaskQueueLoader<R>, run_id: RunId, cancel: CancellationToken) -> Self {
        Self {
            loader,
            run_id,
            cancel,
        }
    }

    /// The loader running this task (e.g. to `stop_with_reason` it).
    pub fn loader(&self) -> &TaskQueueLoader<R> {
        &self.loader
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run has been cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
