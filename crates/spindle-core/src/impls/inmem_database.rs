//! InMemoryDatabase - Database for development and tests
//!
//! # Details
//! - the whole state lives in a `Mutex<S>`
//! - read: hands `&S` to the closure while holding the lock
//! - write: runs the closure on a copy and swaps it in only on `Ok`
//!   (`Err` leaves nothing behind = rollback)

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::BoxError;
use crate::ports::Database;

/// Copy-on-write transactional cell.
///
/// Read and write transactions are both plain `S`. Good enough for tests and
/// demos; writes are serialized by the lock.
#[derive(Debug, Default)]
pub struct InMemoryDatabase<S> {
    state: Mutex<S>,
}

impl<S: Clone + Send + Sync + 'static> InMemoryDatabase<S> {
    pub fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Copy of the committed state.
    pub fn snapshot(&self) -> S {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, S> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<S: Clone + Send + Sync + 'static> Database for InMemoryDatabase<S> {
    type ReadTx = S;
    type WriteTx = S;

    fn read<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.lock();
        f(&state)
    }

    async fn write<T, F>(&self, f: F) -> Result<T, BoxError>
    where
        T: Send,
        F: FnOnce(&mut S) -> Result<T, BoxError> + Send,
    {
        let mut state = self.lock();
        let mut draft = state.clone();
        let value = f(&mut draft)?;
        *state = draft;
        Ok(value)
    }
}
