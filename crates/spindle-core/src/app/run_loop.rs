//! The body of one run: peek -> dispatch -> outcome -> refill.
//!
//! # Loop
//! 1. cancelled? stop
//! 2. free slot? peek `max_concurrent_tasks` records, skip ids already in
//!    flight, dispatch as many as there are free slots
//! 3. nothing dispatched and nothing in flight? drain and finish
//! 4. wait for any task to finish (or for cancellation), then go to 1
//!
//! Finished tasks free their slot immediately; the loop refills it before
//! waiting on the rest. When the loop stops early (cancellation or a fatal
//! error) it cancels the run and waits for every dispatched task. A fatal
//! error reported by one of those tasks replaces a plain cancellation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::loader::Inner;
use crate::app::{TaskContext, TaskQueueLoader};
use crate::domain::{LoaderError, RunId, TaskRecord, TaskRecordOutcome};
use crate::ports::{Clock, Database, RecordIdOf, RecordOf, TaskRecordRunner, TaskRecordStore};

type TaskResult<R> = (RecordIdOf<R>, Result<(), LoaderError>);

pub(crate) async fn drive<R: TaskRecordRunner>(
    loader: TaskQueueLoader<R>,
    run_id: RunId,
    cancel: CancellationToken,
) -> Result<(), LoaderError> {
    let inner = loader.inner();
    let max = inner.config.max_concurrent_tasks.get();
    let mut in_flight: HashSet<RecordIdOf<R>> = HashSet::with_capacity(max);
    let mut tasks: JoinSet<TaskResult<R>> = JoinSet::new();
    let mut dispatched_total = 0usize;

    info!(max_concurrent_tasks = max, "run started");

    let mut result = loop {
        if cancel.is_cancelled() {
            break Err(LoaderError::Cancelled);
        }

        if in_flight.len() < max {
            let peeked = match inner.db.read(|tx| inner.runner.store().peek(max, tx)) {
                Ok(records) => records,
                Err(err) => break Err(LoaderError::Peek(Arc::from(err))),
            };

            let mut dispatched = 0usize;
            for record in peeked {
                if in_flight.len() >= max {
                    break;
                }
                // peek may hand back records that are still running
                if !in_flight.insert(record.id()) {
                    continue;
                }
                debug!(record_id = ?record.id(), in_flight = in_flight.len(), "dispatching");
                tasks.spawn(run_record(loader.clone(), run_id, cancel.clone(), record));
                dispatched += 1;
            }
            dispatched_total += dispatched;

            if dispatched == 0 && in_flight.is_empty() {
                if !inner.begin_cleanup(run_id) {
                    // stopped between the peek and now
                    break Err(LoaderError::Cancelled);
                }
                debug!(dispatched = dispatched_total, "queue drained");
                inner.runner.did_drain_queue().await;
                break Ok(());
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {}
            joined = tasks.join_next() => match joined {
                Some(Ok((id, result))) => {
                    in_flight.remove(&id);
                    if let Err(err) = result {
                        break Err(err);
                    }
                }
                Some(Err(err)) => break Err(LoaderError::TaskPanicked(err.to_string())),
                None => {}
            },
        }
    };

    if !tasks.is_empty() {
        cancel.cancel();
        debug!(remaining = tasks.len(), "waiting for in-flight tasks");
        while let Some(joined) = tasks.join_next().await {
            let fatal = match joined {
                Ok((_, Err(err))) if !err.is_cancellation() => err,
                Err(err) => LoaderError::TaskPanicked(err.to_string()),
                _ => continue,
            };
            warn!(error = %fatal, "in-flight task failed while stopping");
            result = outranked(result, fatal);
        }
    }

    result
}

/// A queue-fatal error from a child outranks a plain cancellation: the store
/// may be inconsistent and every caller has to hear about it. The first
/// fatal error wins.
fn outranked(current: Result<(), LoaderError>, fatal: LoaderError) -> Result<(), LoaderError> {
    match current {
        Err(err) if err.is_cancellation() => Err(fatal),
        other => other,
    }
}

async fn run_record<R: TaskRecordRunner>(
    loader: TaskQueueLoader<R>,
    run_id: RunId,
    cancel: CancellationToken,
    record: RecordOf<R>,
) -> TaskResult<R> {
    let id = record.id();
    let result = execute(loader, run_id, cancel, &record).await;
    (id, result)
}

async fn execute<R: TaskRecordRunner>(
    loader: TaskQueueLoader<R>,
    run_id: RunId,
    cancel: CancellationToken,
    record: &RecordOf<R>,
) -> Result<(), LoaderError> {
    let inner = loader.inner();

    if let Some(delay) = retry_delay(inner.clock.as_ref(), record) {
        debug!(record_id = ?record.id(), delay_ms = delay.as_millis() as u64, "waiting for retry time");
        tokio::select! {
            _ = cancel.cancelled() => return Err(LoaderError::Cancelled),
            _ = inner.clock.sleep(delay) => {}
        }
    }

    if cancel.is_cancelled() {
        return Err(LoaderError::Cancelled);
    }

    let ctx = TaskContext::new(loader.clone(), run_id, cancel);
    let outcome = inner.runner.run_task(record, &ctx).await;
    record_outcome(inner, record, outcome).await
}

/// Remaining wait before `record` may run, if its retry time is in the future.
fn retry_delay<T: TaskRecord>(clock: &dyn Clock, record: &T) -> Option<Duration> {
    let not_before = record.next_retry_timestamp()?;
    let now = clock.now_millis();
    (not_before > now).then(|| Duration::from_millis(not_before - now))
}

/// Apply one outcome inside a single write transaction.
async fn record_outcome<R: TaskRecordRunner>(
    inner: &Inner<R>,
    record: &RecordOf<R>,
    outcome: TaskRecordOutcome,
) -> Result<(), LoaderError> {
    let kind = outcome.kind();
    match &outcome {
        TaskRecordOutcome::RetryableError(err) | TaskRecordOutcome::UnretryableError(err) => {
            warn!(record_id = ?record.id(), ?kind, error = %err, "task failed")
        }
        TaskRecordOutcome::Cancelled => info!(record_id = ?record.id(), "task cancelled"),
        TaskRecordOutcome::Success => debug!(record_id = ?record.id(), "task succeeded"),
    }

    let runner = Arc::clone(&inner.runner);
    let owned = record.clone();
    inner
        .db
        .write(move |tx| {
            if outcome.removes_record() {
                runner.store().remove_record(&owned, tx)?;
            }
            match outcome {
                TaskRecordOutcome::Success => runner.did_succeed(&owned, tx),
                TaskRecordOutcome::RetryableError(err) => {
                    runner.did_fail(&owned, err.as_ref(), true, tx)
                }
                TaskRecordOutcome::UnretryableError(err) => {
                    runner.did_fail(&owned, err.as_ref(), false, tx)
                }
                TaskRecordOutcome::Cancelled => runner.did_cancel(&owned, tx),
            }
        })
        .await
        .map_err(|err| LoaderError::Bookkeeping {
            record: format!("{:?}", record.id()),
            cause: Arc::from(err),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ManualClock;
    use chrono::{TimeZone, Utc};

    #[derive(Clone)]
    struct Scheduled(Option<u64>);

    impl TaskRecord for Scheduled {
        type Id = u8;

        fn id(&self) -> u8 {
            0
        }

        fn next_retry_timestamp(&self) -> Option<u64> {
            self.0
        }
    }

    #[test]
    fn fatal_child_error_outranks_cancellation() {
        let bookkeeping = || LoaderError::Bookkeeping {
            record: "3".to_string(),
            cause: Arc::from(crate::domain::BoxError::from("tx aborted")),
        };

        let replaced = outranked(Err(LoaderError::stopped("low disk")), bookkeeping());
        assert!(matches!(replaced, Err(LoaderError::Bookkeeping { .. })));

        let replaced = outranked(Err(LoaderError::Cancelled), LoaderError::TaskPanicked("boom".into()));
        assert!(matches!(replaced, Err(LoaderError::TaskPanicked(_))));

        // first fatal error wins, success stays success
        let kept = outranked(Err(LoaderError::Peek(Arc::from(crate::domain::BoxError::from("io")))), bookkeeping());
        assert!(matches!(kept, Err(LoaderError::Peek(_))));
        assert!(outranked(Ok(()), bookkeeping()).is_ok());
    }

    #[test]
    fn retry_delay_is_the_remaining_time() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let now = clock.now_millis();

        assert_eq!(retry_delay(&clock, &Scheduled(None)), None);
        assert_eq!(retry_delay(&clock, &Scheduled(Some(now - 1))), None);
        assert_eq!(retry_delay(&clock, &Scheduled(Some(now))), None);
        assert_eq!(
            retry_delay(&clock, &Scheduled(Some(now + 2_500))),
            Some(Duration::from_millis(2_500))
        );
    }
}
