//! Ports - the seams between the loader and the outside world.
//!
//! A concrete use of the loader implements [`TaskRecordStore`] and
//! [`TaskRecordRunner`]; [`Database`] and [`Clock`] are usually provided by
//! the host application (or by `impls` in tests and demos).

pub mod clock;
pub mod database;
pub mod id_generator;
pub mod runner;
pub mod task_store;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::database::{Database, ReadTx, WriteTx};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::runner::{DbOf, RecordIdOf, RecordOf, TaskError, TaskRecordRunner, WriteTxOf};
pub use self::task_store::TaskRecordStore;
