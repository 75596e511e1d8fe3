//! spindle-core
//!
//! Bounded-concurrency loader for persisted task queues.
//!
//! A host describes its queue with two traits: a [`TaskRecordStore`] that
//! can `peek` pending records and remove finished ones, and a
//! [`TaskRecordRunner`] that executes one record and records side effects of
//! its outcome. [`TaskQueueLoader`] runs everything in the store with at most
//! `max_concurrent_tasks` records in flight, until the queue is drained.
//!
//! # Modules
//! - **domain**: domain model (ids, record, outcome, state, errors)
//! - **ports**: seams (Database, TaskRecordStore, TaskRecordRunner, Clock, IdGenerator)
//! - **app**: TaskQueueLoader and its configuration
//! - **impls**: in-memory implementations (tests and demos)

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use crate::app::{ConfigError, LoaderConfig, RetryPolicy, TaskContext, TaskQueueLoader};
pub use crate::domain::{BoxError, LoaderError, LoaderStatus, TaskRecord, TaskRecordOutcome};
pub use crate::ports::{Clock, Database, SystemClock, TaskRecordRunner, TaskRecordStore};

/// Re-exported so hosts don't need a direct dependency to drive
/// `load_and_run_tasks_until`.
pub use tokio_util::sync::CancellationToken;
