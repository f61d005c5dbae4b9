//! The serialization bridge engine.
//!
//! A [`Bridge`] converts between one domain value type and the primitive
//! [`Storable`](crate::types::Storable) shape the underlying suite can
//! persist. Bridges are stateless; one shared instance serves every key of
//! the type. A type joins the engine by implementing [`Serializable`] and
//! naming its bridge.
//!
//! Which bridge a type should name follows a fixed priority order, because a
//! type often qualifies for several and the order encodes intent (most
//! storage-efficient, most semantically faithful option first):
//!
//! 1. A custom [`Bridge`] written for the type (always wins).
//! 2. Native primitives (`bool`, fixed-width integers, floats, `String`,
//!    `Bytes`, `Timestamp`/`SystemTime`, `Url`, `Uuid`) via [`NativeBridge`],
//!    stored as-is.
//! 3. `Option<T>` via [`OptionBridge`] — transparent; `None` maps to
//!    key-absence rather than a null marker.
//! 4. Custom ordered collections ([`CollectionSerializable`] +
//!    [`CollectionBridge`]) and unordered unique-membership containers
//!    ([`SetAlgebraSerializable`] + [`SetAlgebraBridge`]) — stored as an
//!    array of the element's storable form.
//! 5. `Vec<T>` / `HashSet<T>` via [`ArrayBridge`] / [`SetBridge`].
//! 6. `HashMap<K, V>` / `BTreeMap<K, V>` with string-convertible keys via
//!    [`DictionaryBridge`] / [`SortedDictionaryBridge`].
//! 7. Enumerations with a raw-value representation ([`RawValue`] +
//!    [`RawValueBridge`]) — stored as the raw value directly.
//! 8. Structurally-encodable types via [`JsonBridge`] — stored as UTF-8
//!    JSON text, since the suite only accepts primitive shapes.
//! 9. Archivable types via [`ArchiveBridge`] — stored as an opaque
//!    MessagePack byte blob; explicit opt-in for types that also qualify
//!    for 8.
//!
//! Nested composites bridge recursively, one storable level at a time: an
//! array of maps of arrays serializes inner-out.

mod collections;
mod encoded;
mod primitives;

pub use collections::{
    ArrayBridge, CollectionBridge, CollectionSerializable, DictionaryBridge, OptionBridge,
    RangeBridge, RangeInclusiveBridge, SetAlgebraBridge, SetAlgebraSerializable, SetBridge,
    SortedDictionaryBridge,
};
pub use encoded::{ArchiveBridge, JsonBridge, RawValue, RawValueBridge};
pub use primitives::{NativeBridge, NativeValue};

use crate::types::Storable;

/// A stateless two-way mapping between a value type and its storable form.
///
/// `serialize` returning `None` means "remove the underlying entry" (the
/// transparent `Option` case). `deserialize` returning `None` means the raw
/// value does not decode as `Value`; callers degrade to the key default
/// rather than erroring.
pub trait Bridge {
    type Value;

    fn serialize(&self, value: Option<&Self::Value>) -> Option<Storable>;

    fn deserialize(&self, raw: Option<&Storable>) -> Option<Self::Value>;
}

/// A type that can be persisted through the bridge engine.
///
/// Implementations are one-liners naming the bridge that applies, e.g.
///
/// ```ignore
/// struct Fruit { name: String }
/// impl Serializable for Fruit {
///     type Bridge = JsonBridge<Fruit>;
/// }
/// ```
pub trait Serializable: Sized {
    type Bridge: Bridge<Value = Self> + Default;

    fn bridge() -> Self::Bridge {
        Self::Bridge::default()
    }
}
