//! Outcome of running one task record.
//!
//! The runner classifies its own errors; the loader only decides, from the
//! variant, whether the record is removed and which callback runs.

use serde::{Deserialize, Serialize};

use super::errors::BoxError;

/// Result of one `run_task` invocation.
///
/// | variant            | record removed | callback                    |
/// |--------------------|----------------|-----------------------------|
/// | `Success`          | yes            | `did_succeed`               |
/// | `RetryableError`   | no             | `did_fail(.., true, ..)`    |
/// | `UnretryableError` | yes            | `did_fail(.., false, ..)`   |
/// | `Cancelled`        | yes            | `did_cancel`                |
#[derive(Debug)]
pub enum TaskRecordOutcome {
    Success,
    RetryableError(BoxError),
    UnretryableError(BoxError),
    Cancelled,
}

impl TaskRecordOutcome {
    pub fn retryable(error: impl Into<BoxError>) -> Self {
        Self::RetryableError(error.into())
    }

    pub fn unretryable(error: impl Into<BoxError>) -> Self {
        Self::UnretryableError(error.into())
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success => OutcomeKind::Success,
            Self::RetryableError(_) => OutcomeKind::RetryableError,
            Self::UnretryableError(_) => OutcomeKind::UnretryableError,
            Self::Cancelled => OutcomeKind::Cancelled,
        }
    }

    /// Whether bookkeeping deletes the record from the store.
    pub fn removes_record(&self) -> bool {
        !matches!(self, Self::RetryableError(_))
    }
}

/// Data-less classification of [`TaskRecordOutcome`], for logs and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    RetryableError,
    UnretryableError,
    Cancelled,
}
