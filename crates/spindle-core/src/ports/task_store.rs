//! TaskRecordStore port - adapter over the table holding pending records.
//!
//! # Contract
//! - `peek` is read-only and defines priority: the first records returned are
//!   attempted first. It may return fewer than `count`, and may return records
//!   that are already running; the loader filters those out.
//! - `remove_record` runs inside the same write transaction as the runner's
//!   callback and should be idempotent by id.

use crate::domain::{BoxError, TaskRecord};
use crate::ports::database::{Database, ReadTx, WriteTx};

pub trait TaskRecordStore: Send + Sync + 'static {
    type Record: TaskRecord;
    type Db: Database;

    fn peek(&self, count: usize, tx: &ReadTx<Self::Db>) -> Result<Vec<Self::Record>, BoxError>;

    fn remove_record(
        &self,
        record: &Self::Record,
        tx: &mut WriteTx<Self::Db>,
    ) -> Result<(), BoxError>;
}
