//! Database port - transactional read/write executor.
//!
//! The loader never talks to storage directly. It asks the database for a
//! read transaction to `peek`, and for one write transaction per finished
//! task to apply the outcome (remove-or-not plus the runner callback).
//!
//! # Contract
//! - `read` runs the closure against a consistent view and returns its value
//! - `write` runs the closure atomically: if it returns `Err`, nothing it did
//!   is kept
//! - both may be called repeatedly and concurrently (one write per finishing
//!   task)

use async_trait::async_trait;

use crate::domain::BoxError;

#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Handle passed to read closures.
    type ReadTx;

    /// Handle passed to write closures.
    type WriteTx;

    fn read<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&Self::ReadTx) -> T;

    async fn write<T, F>(&self, f: F) -> Result<T, BoxError>
    where
        T: Send,
        F: FnOnce(&mut Self::WriteTx) -> Result<T, BoxError> + Send;
}

pub type ReadTx<D> = <D as Database>::ReadTx;
pub type WriteTx<D> = <D as Database>::WriteTx;
