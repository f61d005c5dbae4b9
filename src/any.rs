//! Type-erased values.
//!
//! [`AnyValue`] holds any bridgeable value together with a type tag, so
//! heterogeneous collections can round-trip losslessly and the origin type
//! can be recovered independent of the reader's expectation. Extraction is
//! tag-exact: an `Int8` payload does not come back out as an `i16` even
//! though the numeric value would fit.

use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value as Json};

use crate::bridge::{Bridge, Serializable};
use crate::types::{Storable, Timestamp};

/// Type discriminator carried alongside an [`AnyValue`] payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Bytes,
    Date,
    Array,
    Map,
    Encoded,
    Archived,
}

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::Int8 => "int8",
            TypeTag::Int16 => "int16",
            TypeTag::Int32 => "int32",
            TypeTag::Int64 => "int64",
            TypeTag::UInt8 => "uint8",
            TypeTag::UInt16 => "uint16",
            TypeTag::UInt32 => "uint32",
            TypeTag::UInt64 => "uint64",
            TypeTag::Float32 => "float32",
            TypeTag::Float64 => "float64",
            TypeTag::String => "string",
            TypeTag::Bytes => "bytes",
            TypeTag::Date => "date",
            TypeTag::Array => "array",
            TypeTag::Map => "map",
            TypeTag::Encoded => "encoded",
            TypeTag::Archived => "archived",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => TypeTag::Bool,
            "int8" => TypeTag::Int8,
            "int16" => TypeTag::Int16,
            "int32" => TypeTag::Int32,
            "int64" => TypeTag::Int64,
            "uint8" => TypeTag::UInt8,
            "uint16" => TypeTag::UInt16,
            "uint32" => TypeTag::UInt32,
            "uint64" => TypeTag::UInt64,
            "float32" => TypeTag::Float32,
            "float64" => TypeTag::Float64,
            "string" => TypeTag::String,
            "bytes" => TypeTag::Bytes,
            "date" => TypeTag::Date,
            "array" => TypeTag::Array,
            "map" => TypeTag::Map,
            "encoded" => TypeTag::Encoded,
            "archived" => TypeTag::Archived,
            _ => return None,
        })
    }
}

/// A tagged value. The tag is fused with the payload so the two can never
/// disagree. Equality and hashing are structural over (tag, payload), with
/// floats compared bitwise so values are usable as set elements and map keys.
#[derive(Clone, Debug)]
pub enum AnyValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(Timestamp),
    Array(Vec<AnyValue>),
    Map(BTreeMap<String, AnyValue>),
    /// JSON text of a structurally-encoded value.
    Encoded(String),
    /// Opaque archived byte blob.
    Archived(Vec<u8>),
}

impl PartialEq for AnyValue {
    fn eq(&self, other: &Self) -> bool {
        use AnyValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Int8(a), Int8(b)) => a == b,
            (Int16(a), Int16(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (UInt8(a), UInt8(b)) => a == b,
            (UInt16(a), UInt16(b)) => a == b,
            (UInt32(a), UInt32(b)) => a == b,
            (UInt64(a), UInt64(b)) => a == b,
            (Float32(a), Float32(b)) => a.to_bits() == b.to_bits(),
            (Float64(a), Float64(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Encoded(a), Encoded(b)) => a == b,
            (Archived(a), Archived(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AnyValue {}

impl Hash for AnyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use AnyValue::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Bool(v) => v.hash(state),
            Int8(v) => v.hash(state),
            Int16(v) => v.hash(state),
            Int32(v) => v.hash(state),
            Int64(v) => v.hash(state),
            UInt8(v) => v.hash(state),
            UInt16(v) => v.hash(state),
            UInt32(v) => v.hash(state),
            UInt64(v) => v.hash(state),
            Float32(v) => v.to_bits().hash(state),
            Float64(v) => v.to_bits().hash(state),
            String(v) => v.hash(state),
            Bytes(v) => v.hash(state),
            Date(v) => v.hash(state),
            Array(v) => v.hash(state),
            Map(v) => v.hash(state),
            Encoded(v) => v.hash(state),
            Archived(v) => v.hash(state),
        }
    }
}

impl AnyValue {
    /// Boxes a typed value.
    pub fn new<T: AnyConvertible>(value: T) -> Self {
        value.into_any()
    }

    /// Extracts the contained value as `T`. Succeeds only if the stored tag
    /// is exactly `T`'s tag; no numeric widening or narrowing.
    pub fn get<T: AnyConvertible>(&self) -> Option<T> {
        T::from_any(self)
    }

    /// Replaces payload and tag in place.
    pub fn set<T: AnyConvertible>(&mut self, value: T) {
        *self = value.into_any();
    }

    pub fn tag(&self) -> TypeTag {
        match self {
            AnyValue::Bool(_) => TypeTag::Bool,
            AnyValue::Int8(_) => TypeTag::Int8,
            AnyValue::Int16(_) => TypeTag::Int16,
            AnyValue::Int32(_) => TypeTag::Int32,
            AnyValue::Int64(_) => TypeTag::Int64,
            AnyValue::UInt8(_) => TypeTag::UInt8,
            AnyValue::UInt16(_) => TypeTag::UInt16,
            AnyValue::UInt32(_) => TypeTag::UInt32,
            AnyValue::UInt64(_) => TypeTag::UInt64,
            AnyValue::Float32(_) => TypeTag::Float32,
            AnyValue::Float64(_) => TypeTag::Float64,
            AnyValue::String(_) => TypeTag::String,
            AnyValue::Bytes(_) => TypeTag::Bytes,
            AnyValue::Date(_) => TypeTag::Date,
            AnyValue::Array(_) => TypeTag::Array,
            AnyValue::Map(_) => TypeTag::Map,
            AnyValue::Encoded(_) => TypeTag::Encoded,
            AnyValue::Archived(_) => TypeTag::Archived,
        }
    }

    /// Boxes a serde type as JSON text under the `encoded` tag.
    pub fn encode<T: Serialize>(value: &T) -> Option<Self> {
        serde_json::to_string(value).ok().map(AnyValue::Encoded)
    }

    /// Recovers a serde type from an `encoded` payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            AnyValue::Encoded(text) => serde_json::from_str(text).ok(),
            _ => None,
        }
    }

    /// Boxes a serde type as a MessagePack blob under the `archived` tag.
    pub fn archive<T: Serialize>(value: &T) -> Option<Self> {
        rmp_serde::to_vec(value).ok().map(AnyValue::Archived)
    }

    /// Recovers a serde type from an `archived` payload.
    pub fn unarchive<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            AnyValue::Archived(bytes) => rmp_serde::from_slice(bytes).ok(),
            _ => None,
        }
    }

    /// Classifies a plain storable value written by untagged code. Integers
    /// land on the widest tag of their sign since the original width is
    /// unknown.
    pub fn from_storable(raw: &Storable) -> Self {
        match raw {
            Storable::Bool(v) => AnyValue::Bool(*v),
            Storable::Int(v) => AnyValue::Int64(*v),
            Storable::UInt(v) => AnyValue::UInt64(*v),
            Storable::Float(v) => AnyValue::Float64(*v),
            Storable::String(v) => AnyValue::String(v.clone()),
            Storable::Bytes(v) => AnyValue::Bytes(v.clone()),
            Storable::Date(v) => AnyValue::Date(*v),
            Storable::Array(items) => {
                AnyValue::Array(items.iter().map(AnyValue::from_storable).collect())
            }
            Storable::Map(entries) => AnyValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), AnyValue::from_storable(v)))
                    .collect(),
            ),
        }
    }

    /// The persisted envelope: `{"type": tag, "value": payload}`, recursive
    /// for arrays and maps. Non-finite floats are spelled as strings since
    /// JSON has no representation for them.
    pub fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }

    pub fn from_json(text: &str) -> Option<Self> {
        Self::from_json_value(&serde_json::from_str(text).ok()?)
    }

    fn to_json_value(&self) -> Json {
        let value = match self {
            AnyValue::Bool(v) => json!(v),
            AnyValue::Int8(v) => json!(v),
            AnyValue::Int16(v) => json!(v),
            AnyValue::Int32(v) => json!(v),
            AnyValue::Int64(v) => json!(v),
            AnyValue::UInt8(v) => json!(v),
            AnyValue::UInt16(v) => json!(v),
            AnyValue::UInt32(v) => json!(v),
            AnyValue::UInt64(v) => json!(v),
            AnyValue::Float32(v) => float_to_json(f64::from(*v)),
            AnyValue::Float64(v) => float_to_json(*v),
            AnyValue::String(v) => json!(v),
            AnyValue::Bytes(v) => json!(v),
            AnyValue::Date(v) => json!(v.0),
            AnyValue::Array(items) => {
                Json::Array(items.iter().map(AnyValue::to_json_value).collect())
            }
            AnyValue::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json_value()))
                    .collect(),
            ),
            AnyValue::Encoded(v) => json!(v),
            AnyValue::Archived(v) => json!(v),
        };
        json!({ "type": self.tag().name(), "value": value })
    }

    fn from_json_value(envelope: &Json) -> Option<Self> {
        let tag = TypeTag::from_name(envelope.get("type")?.as_str()?)?;
        let value = envelope.get("value")?;
        Some(match tag {
            TypeTag::Bool => AnyValue::Bool(value.as_bool()?),
            TypeTag::Int8 => AnyValue::Int8(value.as_i64()?.try_into().ok()?),
            TypeTag::Int16 => AnyValue::Int16(value.as_i64()?.try_into().ok()?),
            TypeTag::Int32 => AnyValue::Int32(value.as_i64()?.try_into().ok()?),
            TypeTag::Int64 => AnyValue::Int64(value.as_i64()?),
            TypeTag::UInt8 => AnyValue::UInt8(value.as_u64()?.try_into().ok()?),
            TypeTag::UInt16 => AnyValue::UInt16(value.as_u64()?.try_into().ok()?),
            TypeTag::UInt32 => AnyValue::UInt32(value.as_u64()?.try_into().ok()?),
            TypeTag::UInt64 => AnyValue::UInt64(value.as_u64()?),
            TypeTag::Float32 => AnyValue::Float32(float_from_json(value)? as f32),
            TypeTag::Float64 => AnyValue::Float64(float_from_json(value)?),
            TypeTag::String => AnyValue::String(value.as_str()?.to_string()),
            TypeTag::Bytes => AnyValue::Bytes(bytes_from_json(value)?),
            TypeTag::Date => AnyValue::Date(Timestamp(value.as_i64()?)),
            TypeTag::Array => AnyValue::Array(
                value
                    .as_array()?
                    .iter()
                    .map(Self::from_json_value)
                    .collect::<Option<_>>()?,
            ),
            TypeTag::Map => AnyValue::Map(
                value
                    .as_object()?
                    .iter()
                    .map(|(k, v)| Some((k.clone(), Self::from_json_value(v)?)))
                    .collect::<Option<_>>()?,
            ),
            TypeTag::Encoded => AnyValue::Encoded(value.as_str()?.to_string()),
            TypeTag::Archived => AnyValue::Archived(bytes_from_json(value)?),
        })
    }
}

fn float_to_json(value: f64) -> Json {
    if value.is_finite() {
        json!(value)
    } else if value.is_nan() {
        json!("nan")
    } else if value > 0.0 {
        json!("inf")
    } else {
        json!("-inf")
    }
}

fn float_from_json(value: &Json) -> Option<f64> {
    match value {
        Json::String(s) => match s.as_str() {
            "nan" => Some(f64::NAN),
            "inf" => Some(f64::INFINITY),
            "-inf" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => value.as_f64(),
    }
}

fn bytes_from_json(value: &Json) -> Option<Vec<u8>> {
    value
        .as_array()?
        .iter()
        .map(|byte| byte.as_u64()?.try_into().ok())
        .collect()
}

/// Conversion between a typed value and its tagged erased form.
///
/// Primitives pick the tag matching their exact width; collections defer to
/// each element's own tag.
pub trait AnyConvertible: Sized {
    fn into_any(self) -> AnyValue;

    fn from_any(any: &AnyValue) -> Option<Self>;
}

macro_rules! convertible {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl AnyConvertible for $ty {
                fn into_any(self) -> AnyValue {
                    AnyValue::$variant(self)
                }

                fn from_any(any: &AnyValue) -> Option<Self> {
                    match any {
                        AnyValue::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for AnyValue {
                fn from(value: $ty) -> Self {
                    AnyValue::$variant(value)
                }
            }
        )*
    };
}

convertible! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Timestamp => Date,
}

impl From<&str> for AnyValue {
    fn from(value: &str) -> Self {
        AnyValue::String(value.to_string())
    }
}

impl AnyConvertible for AnyValue {
    fn into_any(self) -> AnyValue {
        self
    }

    fn from_any(any: &AnyValue) -> Option<Self> {
        Some(any.clone())
    }
}

impl<T: AnyConvertible> AnyConvertible for Vec<T> {
    fn into_any(self) -> AnyValue {
        AnyValue::Array(self.into_iter().map(T::into_any).collect())
    }

    fn from_any(any: &AnyValue) -> Option<Self> {
        match any {
            AnyValue::Array(items) => items.iter().map(T::from_any).collect(),
            _ => None,
        }
    }
}

impl<T: AnyConvertible> AnyConvertible for BTreeMap<String, T> {
    fn into_any(self) -> AnyValue {
        AnyValue::Map(self.into_iter().map(|(k, v)| (k, v.into_any())).collect())
    }

    fn from_any(any: &AnyValue) -> Option<Self> {
        match any {
            AnyValue::Map(entries) => entries
                .iter()
                .map(|(k, v)| Some((k.clone(), T::from_any(v)?)))
                .collect(),
            _ => None,
        }
    }
}

impl<T: AnyConvertible> AnyConvertible for HashMap<String, T> {
    fn into_any(self) -> AnyValue {
        AnyValue::Map(self.into_iter().map(|(k, v)| (k, v.into_any())).collect())
    }

    fn from_any(any: &AnyValue) -> Option<Self> {
        match any {
            AnyValue::Map(entries) => entries
                .iter()
                .map(|(k, v)| Some((k.clone(), T::from_any(v)?)))
                .collect(),
            _ => None,
        }
    }
}

/// Bridge persisting [`AnyValue`] as envelope text.
///
/// On the way back, an entry that is not an envelope (written by code that
/// never tagged it) is classified from its storable shape instead of being
/// dropped.
#[derive(Default)]
pub struct AnyBridge;

impl Bridge for AnyBridge {
    type Value = AnyValue;

    fn serialize(&self, value: Option<&AnyValue>) -> Option<Storable> {
        Some(Storable::String(value?.to_json()))
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<AnyValue> {
        let raw = raw?;
        if let Storable::String(text) = raw {
            if let Some(value) = AnyValue::from_json(text) {
                return Some(value);
            }
        }
        Some(AnyValue::from_storable(raw))
    }
}

impl Serializable for AnyValue {
    type Bridge = AnyBridge;
}
