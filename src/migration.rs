//! One-time migration of legacy JSON-text entries to native bridged form.
//!
//! Before the bridge engine, every value was persisted as the JSON text of a
//! "codable form" type. Migration reads that legacy text, converts the
//! codable form to the native value, and rewrites the entry through the
//! native bridge. Running it again on a migrated key is a no-op: legacy
//! decode fails, the native bridge recognizes the stored value, done.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::bridge::{Bridge, Serializable};
use crate::error::{Result, StoreError};
use crate::key::Key;
use crate::types::{Storable, Timestamp};

/// Storage format versions a key can be migrated to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Version {
    /// Native bridged storage.
    V5,
}

/// What a migration run did to one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// A legacy entry was decoded and rewritten in native form.
    Migrated,
    /// Nothing to do: the entry is absent or already native.
    Skipped,
}

/// The legacy on-disk shape of a native type, and the one-way conversion
/// out of it.
pub trait CodableType: DeserializeOwned {
    type NativeForm: Serializable;

    fn to_native(self) -> Self::NativeForm;
}

/// A native type that knows its legacy codable form.
pub trait NativeType: Serializable {
    type CodableForm: CodableType<NativeForm = Self>;
}

macro_rules! identity_codable {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CodableType for $ty {
                type NativeForm = $ty;

                fn to_native(self) -> $ty {
                    self
                }
            }

            impl NativeType for $ty {
                type CodableForm = $ty;
            }
        )*
    };
}

identity_codable!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, Timestamp);

impl<C: CodableType> CodableType for Option<C> {
    type NativeForm = Option<C::NativeForm>;

    fn to_native(self) -> Self::NativeForm {
        self.map(C::to_native)
    }
}

impl<T: NativeType> NativeType for Option<T> {
    type CodableForm = Option<T::CodableForm>;
}

impl<C: CodableType> CodableType for Vec<C> {
    type NativeForm = Vec<C::NativeForm>;

    fn to_native(self) -> Self::NativeForm {
        self.into_iter().map(C::to_native).collect()
    }
}

impl<T: NativeType> NativeType for Vec<T> {
    type CodableForm = Vec<T::CodableForm>;
}

impl<C: CodableType> CodableType for HashMap<String, C> {
    type NativeForm = HashMap<String, C::NativeForm>;

    fn to_native(self) -> Self::NativeForm {
        self.into_iter().map(|(k, v)| (k, v.to_native())).collect()
    }
}

impl<T: NativeType> NativeType for HashMap<String, T> {
    type CodableForm = HashMap<String, T::CodableForm>;
}

/// Legacy form of a set: the JSON array it was stored as.
#[derive(Deserialize)]
#[serde(transparent)]
pub struct SetForm<C>(pub Vec<C>);

impl<C: CodableType> CodableType for SetForm<C>
where
    C::NativeForm: Eq + Hash,
{
    type NativeForm = HashSet<C::NativeForm>;

    fn to_native(self) -> Self::NativeForm {
        self.0.into_iter().map(C::to_native).collect()
    }
}

impl<T: NativeType + Eq + Hash> NativeType for HashSet<T> {
    type CodableForm = SetForm<T::CodableForm>;
}

/// Migrates one key to `version`.
///
/// - absent entry: `Skipped`
/// - legacy JSON text that decodes as the codable form: rewritten through
///   the native bridge, `Migrated`
/// - anything the native bridge already understands: `Skipped`, stored
///   bytes untouched
/// - neither: `Err(Deserialization)`
pub fn migrate<T>(key: &Key<T>, version: Version) -> Result<MigrationOutcome>
where
    T: NativeType + Clone,
{
    let Version::V5 = version;

    let suite = key.suite();
    if !suite.contains(key.name()) {
        return Ok(MigrationOutcome::Skipped);
    }
    // contains() was true, so this is the stored entry, not a registered
    // default.
    let raw = match suite.get_raw(key.name()) {
        Some(raw) => raw,
        None => return Ok(MigrationOutcome::Skipped),
    };

    if let Storable::String(text) = &raw {
        if let Ok(codable) = serde_json::from_str::<T::CodableForm>(text) {
            let native = codable.to_native();
            suite.set_raw(key.name(), T::bridge().serialize(Some(&native)));
            tracing::debug!(key = key.name(), "migrated legacy entry");
            return Ok(MigrationOutcome::Migrated);
        }
    }

    if T::bridge().deserialize(Some(&raw)).is_some() {
        return Ok(MigrationOutcome::Skipped);
    }

    Err(StoreError::Deserialization(format!(
        "key {:?} holds neither a legacy nor a native value",
        key.name()
    )))
}

/// Object-safe migration entry point, for batching heterogeneous keys.
pub trait MigratableKey: Send + Sync {
    fn migrate(&self, version: Version) -> Result<MigrationOutcome>;
}

impl<T> MigratableKey for Key<T>
where
    T: NativeType + Clone + Send + Sync,
{
    fn migrate(&self, version: Version) -> Result<MigrationOutcome> {
        migrate(self, version)
    }
}

/// Migrates each key independently. One failure never aborts the others;
/// outcomes come back in input order.
pub fn migrate_keys(
    keys: &[&dyn MigratableKey],
    version: Version,
) -> Vec<Result<MigrationOutcome>> {
    keys.iter().map(|key| key.migrate(version)).collect()
}
