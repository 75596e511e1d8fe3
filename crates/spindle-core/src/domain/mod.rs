//! Domain model (ids, records, outcomes, errors, status).

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod record;
pub mod state;

pub use self::errors::{BoxError, LoaderError, SharedError};
pub use self::ids::{ObserverId, RunId};
pub use self::outcome::{OutcomeKind, TaskRecordOutcome};
pub use self::record::TaskRecord;
pub use self::state::LoaderStatus;
