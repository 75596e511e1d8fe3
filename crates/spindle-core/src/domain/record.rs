//! Task record: the unit of work the loader pulls from a store.

use std::fmt::Debug;
use std::hash::Hash;

/// One persisted unit of pending work.
///
/// Identity is defined solely by [`TaskRecord::id`]: two values with the same
/// id are the same logical task, whatever their other fields say.
///
/// Lifecycle:
/// - created and persisted by whatever enqueues work
/// - read (never mutated) by the loader via `peek`
/// - deleted by the loader on success, permanent failure or cancellation
/// - left in place on a retryable failure; the runner may rewrite it
///   (retry counter, backoff timestamp) inside `did_fail`
pub trait TaskRecord: Clone + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    fn id(&self) -> Self::Id;

    /// Earliest time (milliseconds since the Unix epoch) this record may run.
    ///
    /// `None` means "runnable immediately".
    fn next_retry_timestamp(&self) -> Option<u64> {
        None
    }
}
