//! Bridges for natively supported primitive types.

use std::marker::PhantomData;
use std::time::SystemTime;

use bytes::Bytes;
use url::Url;
use uuid::Uuid;

use super::{Bridge, Serializable};
use crate::types::{Storable, Timestamp};

/// Conversion between a primitive type and its storable shape.
///
/// Deserialization is range-checked: a stored `Int(300)` does not decode as
/// `u8`. Width information is not preserved at this layer; exact-width
/// discrimination lives in [`AnyValue`](crate::any::AnyValue).
pub trait NativeValue: Sized {
    fn to_storable(&self) -> Storable;

    fn from_storable(raw: &Storable) -> Option<Self>;
}

/// Bridge for types stored as-is in their natural primitive shape.
pub struct NativeBridge<T>(PhantomData<T>);

impl<T> Default for NativeBridge<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: NativeValue> Bridge for NativeBridge<T> {
    type Value = T;

    fn serialize(&self, value: Option<&T>) -> Option<Storable> {
        value.map(NativeValue::to_storable)
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<T> {
        raw.and_then(T::from_storable)
    }
}

macro_rules! native {
    ($type:ty) => {
        impl Serializable for $type {
            type Bridge = NativeBridge<$type>;
        }
    };
}

impl NativeValue for bool {
    fn to_storable(&self) -> Storable {
        Storable::Bool(*self)
    }

    fn from_storable(raw: &Storable) -> Option<Self> {
        match raw {
            Storable::Bool(value) => Some(*value),
            _ => None,
        }
    }
}
native!(bool);

macro_rules! native_signed {
    ($($type:ty),+) => {$(
        impl NativeValue for $type {
            fn to_storable(&self) -> Storable {
                Storable::Int(*self as i64)
            }

            fn from_storable(raw: &Storable) -> Option<Self> {
                match raw {
                    Storable::Int(value) => <$type>::try_from(*value).ok(),
                    Storable::UInt(value) => <$type>::try_from(*value).ok(),
                    _ => None,
                }
            }
        }
        native!($type);
    )+};
}

macro_rules! native_unsigned {
    ($($type:ty),+) => {$(
        impl NativeValue for $type {
            fn to_storable(&self) -> Storable {
                Storable::UInt(*self as u64)
            }

            fn from_storable(raw: &Storable) -> Option<Self> {
                match raw {
                    Storable::UInt(value) => <$type>::try_from(*value).ok(),
                    Storable::Int(value) => <$type>::try_from(*value).ok(),
                    _ => None,
                }
            }
        }
        native!($type);
    )+};
}

native_signed!(i8, i16, i32, i64);
native_unsigned!(u8, u16, u32, u64);

impl NativeValue for f64 {
    fn to_storable(&self) -> Storable {
        Storable::Float(*self)
    }

    fn from_storable(raw: &Storable) -> Option<Self> {
        match raw {
            Storable::Float(value) => Some(*value),
            _ => None,
        }
    }
}
native!(f64);

impl NativeValue for f32 {
    fn to_storable(&self) -> Storable {
        // f32 -> f64 is exact
        Storable::Float(f64::from(*self))
    }

    fn from_storable(raw: &Storable) -> Option<Self> {
        match raw {
            // narrowing is checked the same way integer widths are: a stored
            // f64 decodes as f32 only when widening back reproduces it
            Storable::Float(value) => {
                let narrowed = *value as f32;
                (f64::from(narrowed).to_bits() == value.to_bits()).then_some(narrowed)
            }
            _ => None,
        }
    }
}
native!(f32);

impl NativeValue for String {
    fn to_storable(&self) -> Storable {
        Storable::String(self.clone())
    }

    fn from_storable(raw: &Storable) -> Option<Self> {
        raw.as_str().map(str::to_owned)
    }
}
native!(String);

impl NativeValue for Bytes {
    fn to_storable(&self) -> Storable {
        Storable::Bytes(self.to_vec())
    }

    fn from_storable(raw: &Storable) -> Option<Self> {
        match raw {
            Storable::Bytes(data) => Some(Bytes::copy_from_slice(data)),
            _ => None,
        }
    }
}
native!(Bytes);

impl NativeValue for Timestamp {
    fn to_storable(&self) -> Storable {
        Storable::Date(*self)
    }

    fn from_storable(raw: &Storable) -> Option<Self> {
        match raw {
            Storable::Date(value) => Some(*value),
            _ => None,
        }
    }
}
native!(Timestamp);

impl NativeValue for SystemTime {
    fn to_storable(&self) -> Storable {
        Storable::Date(Timestamp::from_system_time(*self))
    }

    fn from_storable(raw: &Storable) -> Option<Self> {
        match raw {
            Storable::Date(value) => Some(value.to_system_time()),
            _ => None,
        }
    }
}
native!(SystemTime);

impl NativeValue for Url {
    fn to_storable(&self) -> Storable {
        Storable::String(self.as_str().to_owned())
    }

    fn from_storable(raw: &Storable) -> Option<Self> {
        raw.as_str().and_then(|s| Url::parse(s).ok())
    }
}
native!(Url);

impl NativeValue for Uuid {
    fn to_storable(&self) -> Storable {
        Storable::String(self.to_string())
    }

    fn from_storable(raw: &Storable) -> Option<Self> {
        raw.as_str().and_then(|s| s.parse().ok())
    }
}
native!(Uuid);

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Serializable>(value: T) -> Option<T> {
        let raw = T::bridge().serialize(Some(&value))?;
        T::bridge().deserialize(Some(&raw))
    }

    #[test]
    fn test_primitive_roundtrips() {
        assert_eq!(roundtrip(true), Some(true));
        assert_eq!(roundtrip(-42i8), Some(-42i8));
        assert_eq!(roundtrip(i64::MIN), Some(i64::MIN));
        assert_eq!(roundtrip(u64::MAX), Some(u64::MAX));
        assert_eq!(roundtrip(1.5f32), Some(1.5f32));
        assert_eq!(roundtrip(12_131.4f64), Some(12_131.4f64));
        assert_eq!(roundtrip("hello".to_string()), Some("hello".to_string()));
        assert_eq!(
            roundtrip(Bytes::from_static(b"\xff\x00")),
            Some(Bytes::from_static(b"\xff\x00"))
        );
        assert_eq!(roundtrip(Timestamp(12345)), Some(Timestamp(12345)));
    }

    #[test]
    fn test_integer_range_checks() {
        // A stored i64 decodes as i8 only when it fits.
        let raw = Storable::Int(300);
        assert_eq!(i8::from_storable(&raw), None);
        assert_eq!(i16::from_storable(&raw), Some(300));

        // Negative values never decode as unsigned.
        let raw = Storable::Int(-1);
        assert_eq!(u32::from_storable(&raw), None);

        // Unsigned values decode as signed when in range.
        let raw = Storable::UInt(5);
        assert_eq!(i8::from_storable(&raw), Some(5));
    }

    #[test]
    fn test_float_narrowing_checked() {
        // widened f32 values decode back
        assert_eq!(f32::from_storable(&Storable::Float(1.5)), Some(1.5f32));
        assert_eq!(
            f32::from_storable(&Storable::Float(f64::from(f32::MAX))),
            Some(f32::MAX)
        );
        // values an f32 cannot represent do not decode lossily
        assert_eq!(f32::from_storable(&Storable::Float(0.1)), None);
        assert_eq!(f32::from_storable(&Storable::Float(1e300)), None);
        // f64 always accepts what f32 stored
        let raw = f32::bridge().serialize(Some(&2.5f32)).unwrap();
        assert_eq!(f64::from_storable(&raw), Some(2.5f64));
    }

    #[test]
    fn test_shape_mismatch_is_no_value() {
        assert_eq!(bool::from_storable(&Storable::Int(1)), None);
        assert_eq!(String::from_storable(&Storable::Bool(true)), None);
        assert_eq!(f64::from_storable(&Storable::Int(3)), None);
    }

    #[test]
    fn test_url_stored_as_string() {
        let url = Url::parse("https://example.com/a?b=c").unwrap();
        let raw = Url::bridge().serialize(Some(&url)).unwrap();
        assert_eq!(raw, Storable::String("https://example.com/a?b=c".into()));
        assert_eq!(roundtrip(url.clone()), Some(url));

        // an unparsable stored string is no value, not a panic
        let garbage = Storable::String("not a url".into());
        assert_eq!(Url::from_storable(&garbage), None);
    }

    #[test]
    fn test_uuid_stored_as_string() {
        let id = Uuid::new_v4();
        let raw = Uuid::bridge().serialize(Some(&id)).unwrap();
        assert_eq!(raw, Storable::String(id.to_string()));
        assert_eq!(roundtrip(id), Some(id));
    }

    #[test]
    fn test_system_time_roundtrip_microsecond_precision() {
        let time = Timestamp(1_700_000_000_000_042).to_system_time();
        assert_eq!(roundtrip(time), Some(time));
    }
}
