//! Impls - in-memory port implementations (development and tests)
//!
//! - **InMemoryDatabase**: copy-on-write transaction boundary
//! - **InMemoryTaskStore**: TaskRecordStore over a `TaskTable`
//!
//! Production Database / TaskRecordStore implementations live in the host.

pub mod inmem_database;
pub mod inmem_task_store;

// re-exports
pub use self::inmem_database::InMemoryDatabase;
pub use self::inmem_task_store::{InMemoryTaskStore, QueuedTask, TaskTable};
