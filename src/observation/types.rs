//! Observation types for key change notifications.

use crate::types::Storable;

/// Unique identifier for an observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObservationId(pub u64);

/// Delivery options for an observation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObservationOptions {
    /// Synthesize one immediate delivery with old == new == current value
    /// at subscription time.
    pub initial: bool,

    /// Also deliver immediately before each mutation, with the old/new pair
    /// straddling the write.
    pub prior: bool,
}

impl ObservationOptions {
    pub fn initial() -> Self {
        Self {
            initial: true,
            ..Default::default()
        }
    }

    pub fn prior() -> Self {
        Self {
            prior: true,
            ..Default::default()
        }
    }

    pub fn with_initial(mut self) -> Self {
        self.initial = true;
        self
    }

    pub fn with_prior(mut self) -> Self {
        self.prior = true;
        self
    }
}

/// A typed change delivered to a key observer.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeRecord<T> {
    pub old_value: T,
    pub new_value: T,
    /// True when delivered before the mutation lands (prior option).
    pub is_prior: bool,
}

/// A raw before/after pair for one key, as stored.
#[derive(Clone, Debug)]
pub(crate) struct RawChange {
    pub key: String,
    pub old_value: Option<Storable>,
    pub new_value: Option<Storable>,
    pub is_prior: bool,
}
