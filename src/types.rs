//! Core value shapes for the preference store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert from a `SystemTime` (truncates to microseconds).
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(duration) => Timestamp(duration.as_micros() as i64),
            Err(before) => Timestamp(-(before.duration().as_micros() as i64)),
        }
    }

    /// Convert back to a `SystemTime`.
    pub fn to_system_time(self) -> SystemTime {
        if self.0 >= 0 {
            UNIX_EPOCH + Duration::from_micros(self.0 as u64)
        } else {
            UNIX_EPOCH - Duration::from_micros(self.0.unsigned_abs())
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// The primitive shapes the underlying store can persist.
///
/// Every bridge serializes into one of these. Composite shapes nest:
/// an array of maps of arrays is a valid storable value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Storable {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(Timestamp),
    Array(Vec<Storable>),
    Map(BTreeMap<String, Storable>),
}

impl Storable {
    /// Shape name, for diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            Storable::Bool(_) => "bool",
            Storable::Int(_) => "int",
            Storable::UInt(_) => "uint",
            Storable::Float(_) => "float",
            Storable::String(_) => "string",
            Storable::Bytes(_) => "bytes",
            Storable::Date(_) => "date",
            Storable::Array(_) => "array",
            Storable::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Storable::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Storable]> {
        match self {
            Storable::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Storable>> {
        match self {
            Storable::Map(entries) => Some(entries),
            _ => None,
        }
    }
}
