//! Strongly-typed ids for runs and their observers.
//!
//! Both are ULIDs: sortable by creation time, which keeps interleaved logs of
//! consecutive runs readable. The kind parameter only exists at compile time.

use std::fmt;
use std::marker::PhantomData;

use serde::{Serialize, Serializer};
use ulid::Ulid;

/// What an [`Id`] identifies; `PREFIX` is prepended when displayed.
pub trait IdKind: Send + Sync + 'static {
    const PREFIX: &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdKind for Run {
    const PREFIX: &'static str = "run-";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Observer {}

impl IdKind for Observer {
    const PREFIX: &'static str = "observer-";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<K: IdKind>(Ulid, PhantomData<fn() -> K>);

/// One execution of a loader, minted when a run starts from `NotRunning`.
pub type RunId = Id<Run>;

/// One caller waiting on a run.
pub type ObserverId = Id<Observer>;

impl<K: IdKind> Id<K> {
    pub const fn new(ulid: Ulid) -> Self {
        Self(ulid, PhantomData)
    }

    pub fn ulid(self) -> Ulid {
        self.0
    }

    pub fn timestamp_ms(self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl<K: IdKind> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(K::PREFIX)?;
        fmt::Display::fmt(&self.0, f)
    }
}

impl<K: IdKind> Serialize for Id<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_kind() {
        let ulid = Ulid::from_parts(1_700_000_000_000, 42);

        assert_eq!(RunId::new(ulid).to_string(), format!("run-{ulid}"));
        assert_eq!(ObserverId::new(ulid).to_string(), format!("observer-{ulid}"));
        assert_eq!(RunId::new(ulid).timestamp_ms(), 1_700_000_000_000);
    }

    #[test]
    fn serializes_as_display_string() {
        let id = RunId::new(Ulid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"run-{}\"", Ulid::nil()));
    }

    #[test]
    fn same_size_as_a_ulid() {
        assert_eq!(std::mem::size_of::<ObserverId>(), std::mem::size_of::<Ulid>());
    }
}
