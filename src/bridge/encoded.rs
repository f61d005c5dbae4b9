//! Fallback bridges for arbitrary serde types.
//!
//! Types without a structural storable form are carried as an encoded
//! payload inside a single entry. [`RawValueBridge`] stores a type through
//! its raw representation, [`JsonBridge`] as JSON text and [`ArchiveBridge`]
//! as a MessagePack byte blob.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Bridge, Serializable};
use crate::types::Storable;

/// A type defined by a raw underlying value, typically a C-like enum.
///
/// The raw value's own bridge decides the storable shape; `from_raw`
/// rejects raw values with no corresponding case.
pub trait RawValue: Sized {
    type Raw: Serializable;

    fn raw(&self) -> Self::Raw;

    fn from_raw(raw: Self::Raw) -> Option<Self>;
}

/// Bridge for [`RawValue`] types: stores the raw value.
pub struct RawValueBridge<T>(PhantomData<T>);

impl<T> Default for RawValueBridge<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: RawValue> Bridge for RawValueBridge<T> {
    type Value = T;

    fn serialize(&self, value: Option<&T>) -> Option<Storable> {
        T::Raw::bridge().serialize(Some(&value?.raw()))
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<T> {
        T::Raw::bridge().deserialize(raw).and_then(T::from_raw)
    }
}

/// Bridge storing a serde type as JSON text in a string entry.
///
/// The stored entry stays human-readable and greppable at the cost of a
/// parse on every read.
pub struct JsonBridge<T>(PhantomData<T>);

impl<T> Default for JsonBridge<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Serialize + DeserializeOwned> Bridge for JsonBridge<T> {
    type Value = T;

    fn serialize(&self, value: Option<&T>) -> Option<Storable> {
        serde_json::to_string(value?).ok().map(Storable::String)
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<T> {
        serde_json::from_str(raw?.as_str()?).ok()
    }
}

/// Bridge storing a serde type as a MessagePack blob in a bytes entry.
pub struct ArchiveBridge<T>(PhantomData<T>);

impl<T> Default for ArchiveBridge<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Serialize + DeserializeOwned> Bridge for ArchiveBridge<T> {
    type Value = T;

    fn serialize(&self, value: Option<&T>) -> Option<Storable> {
        rmp_serde::to_vec(value?).ok().map(Storable::Bytes)
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<T> {
        match raw? {
            Storable::Bytes(bytes) => rmp_serde::from_slice(bytes).ok(),
            _ => None,
        }
    }
}
