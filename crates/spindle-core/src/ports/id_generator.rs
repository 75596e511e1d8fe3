//! IdGenerator port.
//!
//! Ids take their timestamp from the injected clock, so a `ManualClock` makes
//! them predictable up to the random part.

use crate::domain::ids::{ObserverId, RunId};
use crate::ports::Clock;
use ulid::Ulid;

/// Mints ids for the loader's runs and observers.
pub trait IdGenerator: Send + Sync {
    fn generate_run_id(&self) -> RunId;

    fn generate_observer_id(&self) -> ObserverId;
}

/// Timestamp from `C`, 80 random bits.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn mint(&self) -> Ulid {
        Ulid::from_parts(self.clock.now_millis(), rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_run_id(&self) -> RunId {
        RunId::new(self.mint())
    }

    fn generate_observer_id(&self) -> ObserverId {
        ObserverId::new(self.mint())
    }
}
