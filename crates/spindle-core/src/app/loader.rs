//! TaskQueueLoader - bounded-concurrency runner over a `TaskRecordStore`.
//!
//! # Flow
//! 1. callers invoke `load_and_run_tasks`
//! 2. the first caller starts a run (a spawned task); later callers join it
//! 3. the run peeks the store, dispatches up to `max_concurrent_tasks`
//!    records, applies each outcome in a write transaction, refills slots
//! 4. once a peek yields nothing new and nothing is running,
//!    `did_drain_queue` is called and the loader goes back to `NotRunning`
//!
//! # Coordinator
//! Run state and the observer set live in one `Mutex<Coordinator>`. The lock
//! is only taken for short, synchronous sections and never across `.await`.
//!
//! # Cancellation
//! - a caller that stops waiting leaves the observer set; the run is stopped
//!   only when the last observer leaves
//! - `stop` / `stop_with_reason` always stop the run; the reason (if any) is
//!   what every waiting caller gets back

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::app::LoaderConfig;
use crate::app::run_loop;
use crate::domain::{BoxError, LoaderError, LoaderStatus, ObserverId, RunId, SharedError};
use crate::ports::{Clock, DbOf, IdGenerator, TaskRecordRunner, UlidGenerator};

type RunResult = Option<Result<(), LoaderError>>;

/// Runs the records of one store with a concurrency ceiling.
///
/// Cheap to clone; clones share the same run state.
///
/// # Example
/// ```ignore
/// let loader = TaskQueueLoader::new(config, Arc::new(SystemClock), db, runner);
/// // returns once the queue is drained (or the run failed / was stopped)
/// loader.load_and_run_tasks().await?;
/// ```
pub struct TaskQueueLoader<R: TaskRecordRunner> {
    inner: Arc<Inner<R>>,
}

impl<R: TaskRecordRunner> Clone for TaskQueueLoader<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct Inner<R: TaskRecordRunner> {
    pub(crate) config: LoaderConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) db: Arc<DbOf<R>>,
    pub(crate) runner: Arc<R>,
    ids: UlidGenerator<Arc<dyn Clock>>,
    coordinator: Mutex<Coordinator>,
}

struct Coordinator {
    state: RunState,
    observers: HashSet<ObserverId>,
}

enum RunState {
    NotRunning,
    Running(Execution),
    CleaningUp(Execution),
    Cancelled(Execution),
}

impl RunState {
    fn execution(&self) -> Option<&Execution> {
        match self {
            RunState::NotRunning => None,
            RunState::Running(execution)
            | RunState::CleaningUp(execution)
            | RunState::Cancelled(execution) => Some(execution),
        }
    }

    fn status(&self) -> LoaderStatus {
        match self {
            RunState::NotRunning => LoaderStatus::NotRunning,
            RunState::Running(_) => LoaderStatus::Running,
            RunState::CleaningUp(_) => LoaderStatus::CleaningUp,
            RunState::Cancelled(_) => LoaderStatus::Cancelled,
        }
    }
}

/// Handle on one run.
#[derive(Clone)]
struct Execution {
    run_id: RunId,
    cancel: CancellationToken,
    stop_reason: Arc<OnceLock<SharedError>>,
    done: watch::Receiver<RunResult>,
}

impl Execution {
    /// What a cancelled waiter sees: the stop reason if one was given.
    fn cancellation_error(&self) -> LoaderError {
        match self.stop_reason.get() {
            Some(reason) => LoaderError::Stopped(Arc::clone(reason)),
            None => LoaderError::Cancelled,
        }
    }

    async fn finished(&self) -> Result<(), LoaderError> {
        let mut done = self.done.clone();
        let published = match done.wait_for(Option::is_some).await {
            Ok(result) => (*result).clone(),
            Err(_) => None,
        };
        published.unwrap_or(Err(LoaderError::ExecutionLost))
    }
}

enum Attachment<'a, R: TaskRecordRunner> {
    /// Joined the active run as an observer.
    Observe(ObserverGuard<'a, R>),
    /// The active run is draining or being cancelled; wait for it, then retry.
    Settle(Execution),
}

/// Observer registration; leaves the observer set when dropped, including
/// when the caller's future is dropped mid-await.
struct ObserverGuard<'a, R: TaskRecordRunner> {
    inner: &'a Inner<R>,
    id: ObserverId,
    execution: Execution,
}

impl<R: TaskRecordRunner> Drop for ObserverGuard<'_, R> {
    fn drop(&mut self) {
        self.inner.leave(self.id, self.execution.run_id);
    }
}

impl<R: TaskRecordRunner> TaskQueueLoader<R> {
    pub fn new(config: LoaderConfig, clock: Arc<dyn Clock>, db: Arc<DbOf<R>>, runner: R) -> Self {
        let ids = UlidGenerator::new(Arc::clone(&clock));
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                db,
                runner: Arc::new(runner),
                ids,
                coordinator: Mutex::new(Coordinator {
                    state: RunState::NotRunning,
                    observers: HashSet::new(),
                }),
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub fn max_concurrent_tasks(&self) -> usize {
        self.inner.config.max_concurrent_tasks.get()
    }

    pub fn runner(&self) -> &R {
        &self.inner.runner
    }

    pub fn status(&self) -> LoaderStatus {
        self.inner.lock().state.status()
    }

    /// Number of callers currently waiting on the active run.
    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }

    /// Ensure a run is going and wait for it to finish.
    ///
    /// Concurrent callers share one run. Returns `Ok(())` once the queue has
    /// been drained; returns the run's error if it failed or was stopped.
    /// Dropping the returned future counts as leaving (see module docs).
    pub async fn load_and_run_tasks(&self) -> Result<(), LoaderError> {
        self.load_and_run_tasks_until(&CancellationToken::new()).await
    }

    /// Same as `load_and_run_tasks`, but the caller can give up waiting by
    /// cancelling `caller`.
    ///
    /// Giving up returns `LoaderError::Cancelled`, or `LoaderError::Stopped`
    /// if the run had already been stopped with a reason.
    pub async fn load_and_run_tasks_until(
        &self,
        caller: &CancellationToken,
    ) -> Result<(), LoaderError> {
        loop {
            match self.attach() {
                Attachment::Observe(observer) => return observe(observer, caller).await,
                Attachment::Settle(execution) => {
                    tokio::select! {
                        biased;
                        _ = execution.finished() => {}
                        _ = caller.cancelled() => return Err(execution.cancellation_error()),
                    }
                }
            }
        }
    }

    /// Stop the active run regardless of how many callers wait on it.
    ///
    /// No-op when nothing is running.
    pub fn stop(&self) {
        self.inner.stop(None);
    }

    /// Stop the active run; every waiting caller gets `LoaderError::Stopped(reason)`.
    pub fn stop_with_reason(&self, reason: impl Into<BoxError>) {
        self.inner.stop(Some(Arc::from(reason.into())));
    }

    pub(crate) fn inner(&self) -> &Inner<R> {
        &self.inner
    }

    fn attach(&self) -> Attachment<'_, R> {
        let mut coordinator = self.inner.lock();

        let joined = match &coordinator.state {
            RunState::NotRunning => None,
            RunState::Running(execution) => Some(execution.clone()),
            RunState::CleaningUp(execution) | RunState::Cancelled(execution) => {
                return Attachment::Settle(execution.clone());
            }
        };

        let execution = match joined {
            Some(execution) => execution,
            None => {
                let execution = self.start();
                coordinator.state = RunState::Running(execution.clone());
                coordinator.observers.clear();
                execution
            }
        };

        let id = self.inner.ids.generate_observer_id();
        coordinator.observers.insert(id);
        debug!(
            run_id = %execution.run_id,
            observer = %id,
            observers = coordinator.observers.len(),
            "observer joined"
        );

        Attachment::Observe(ObserverGuard {
            inner: &self.inner,
            id,
            execution,
        })
    }

    /// Spawn a new run. Called with the coordinator lock held; the run cannot
    /// touch the coordinator before the caller has stored the new state.
    fn start(&self) -> Execution {
        let run_id = self.inner.ids.generate_run_id();
        let (done_tx, done) = watch::channel(None);
        let execution = Execution {
            run_id,
            cancel: CancellationToken::new(),
            stop_reason: Arc::default(),
            done,
        };

        let loader = self.clone();
        let supervised = execution.clone();
        let span = info_span!("task_queue", name = %self.inner.config.name, %run_id);

        tokio::spawn(
            async move {
                let driver = tokio::spawn(
                    run_loop::drive(loader.clone(), run_id, supervised.cancel.clone())
                        .in_current_span(),
                );
                let result = match driver.await {
                    Ok(Err(LoaderError::Cancelled)) => Err(supervised.cancellation_error()),
                    Ok(result) => result,
                    Err(err) => Err(LoaderError::TaskPanicked(err.to_string())),
                };

                match &result {
                    Ok(()) => info!("run finished"),
                    Err(err) if err.is_cancellation() => info!(reason = %err, "run cancelled"),
                    Err(err) => warn!(error = %err, "run failed"),
                }

                // NotRunning first, so a caller woken by the result can start the next run
                loader.inner.finish(run_id);
                done_tx.send_replace(Some(result));
            }
            .instrument(span),
        );

        execution
    }
}

async fn observe<R: TaskRecordRunner>(
    observer: ObserverGuard<'_, R>,
    caller: &CancellationToken,
) -> Result<(), LoaderError> {
    let execution = observer.execution.clone();
    tokio::select! {
        biased;
        result = execution.finished() => result,
        _ = caller.cancelled() => {
            // leave before reading the reason: if we were the last observer
            // this is what stops the run
            drop(observer);
            Err(execution.cancellation_error())
        }
    }
}

impl<R: TaskRecordRunner> Inner<R> {
    fn lock(&self) -> MutexGuard<'_, Coordinator> {
        self.coordinator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Running -> CleaningUp, only for the run that still owns the state.
    pub(crate) fn begin_cleanup(&self, run_id: RunId) -> bool {
        let mut coordinator = self.lock();
        let execution = match &coordinator.state {
            RunState::Running(execution) if execution.run_id == run_id => execution.clone(),
            _ => return false,
        };
        coordinator.state = RunState::CleaningUp(execution);
        true
    }

    /// Back to NotRunning, unless a newer run already owns the state.
    fn finish(&self, run_id: RunId) {
        let mut coordinator = self.lock();
        if coordinator
            .state
            .execution()
            .is_some_and(|execution| execution.run_id == run_id)
        {
            coordinator.state = RunState::NotRunning;
        }
    }

    fn stop(&self, reason: Option<SharedError>) {
        let mut coordinator = self.lock();
        Self::stop_locked(&mut coordinator, reason);
    }

    fn stop_locked(coordinator: &mut Coordinator, reason: Option<SharedError>) {
        let execution = match &coordinator.state {
            RunState::Running(execution) | RunState::CleaningUp(execution) => execution.clone(),
            RunState::Cancelled(_) | RunState::NotRunning => return,
        };

        if let Some(reason) = reason {
            // first reason wins
            let _ = execution.stop_reason.set(reason);
        }
        debug!(run_id = %execution.run_id, "stopping run");
        execution.cancel.cancel();
        coordinator.state = RunState::Cancelled(execution);
    }

    fn leave(&self, observer: ObserverId, run_id: RunId) {
        let mut coordinator = self.lock();
        if !coordinator.observers.remove(&observer) || !coordinator.observers.is_empty() {
            return;
        }

        let still_pending = matches!(
            &coordinator.state,
            RunState::Running(execution) | RunState::CleaningUp(execution)
                if execution.run_id == run_id
        );
        if still_pending {
            debug!(%run_id, "last observer left");
            Self::stop_locked(&mut coordinator, None);
        }
    }
}
