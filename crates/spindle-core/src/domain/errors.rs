//! Errors surfaced by the loader.
//!
//! # Classification
//! - task-local: carried inside [`TaskRecordOutcome`](super::TaskRecordOutcome),
//!   never reach this type
//! - queue-fatal: `Peek`, `Bookkeeping`, `TaskPanicked`
//! - cancellation: `Cancelled`, `Stopped`

use std::sync::Arc;

/// Boxed error used at the trait seams (store, runner, database).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared error; one run's result is handed to every joined caller.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LoaderError {
    #[error("task queue run was cancelled")]
    Cancelled,

    #[error("task queue run was stopped: {0}")]
    Stopped(SharedError),

    #[error("failed to peek task records: {0}")]
    Peek(SharedError),

    #[error("bookkeeping for task record {record} failed: {cause}")]
    Bookkeeping { record: String, cause: SharedError },

    #[error("task body panicked: {0}")]
    TaskPanicked(String),

    #[error("task queue run ended without reporting a result")]
    ExecutionLost,
}

impl LoaderError {
    pub fn stopped(reason: impl Into<BoxError>) -> Self {
        Self::Stopped(Arc::from(reason.into()))
    }

    /// `Cancelled` or `Stopped`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Stopped(_))
    }

    /// The reason given to `stop_with_reason`, if this is a forced stop.
    pub fn stop_reason(&self) -> Option<&SharedError> {
        match self {
            Self::Stopped(reason) => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_keeps_the_reason() {
        let err = LoaderError::stopped("low disk space");
        assert!(err.is_cancellation());
        assert_eq!(err.stop_reason().unwrap().to_string(), "low disk space");
        assert_eq!(err.to_string(), "task queue run was stopped: low disk space");
    }

    #[test]
    fn fatal_errors_are_not_cancellations() {
        let err = LoaderError::Peek(Arc::from(BoxError::from("db locked")));
        assert!(!err.is_cancellation());
        assert!(err.stop_reason().is_none());
        assert!(err.to_string().contains("db locked"));
    }

    #[test]
    fn errors_are_cloneable_for_fan_out() {
        let err = LoaderError::Bookkeeping {
            record: "7".to_string(),
            cause: Arc::from(BoxError::from("constraint violated")),
        };
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
