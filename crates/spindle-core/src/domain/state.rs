//! Loader status as seen from the outside.

use serde::Serialize;

/// Snapshot of the loader's run state.
///
/// # Transitions
/// - NotRunning -> Running -> CleaningUp -> NotRunning (queue drained)
/// - NotRunning -> Running -> Cancelled -> NotRunning (stopped)
/// - CleaningUp -> Cancelled (stopped while draining)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderStatus {
    NotRunning,
    Running,
    /// The queue just became empty and `did_drain_queue` is running.
    CleaningUp,
    /// A stop was requested; the run is winding down.
    Cancelled,
}

impl LoaderStatus {
    /// Is there a run that has not finished yet?
    pub fn is_active(self) -> bool {
        !matches!(self, LoaderStatus::NotRunning)
    }
}
