//! Integration tests for the bridge engine and the type-erased container.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use prefstore::{AnyValue, Bridge, Key, Serializable, Storable, Suite, TypeTag};
use proptest::prelude::*;

fn roundtrip<T: Serializable>(value: &T) -> Option<T> {
    let raw = T::bridge().serialize(Some(value))?;
    T::bridge().deserialize(Some(&raw))
}

// --- Structural Round-Trips ---

#[test]
fn test_nested_composite_roundtrip() {
    let mut inner = HashMap::new();
    inner.insert("evens".to_string(), vec![2i64, 4, 6]);
    inner.insert("odds".to_string(), vec![1i64, 3, 5]);
    let value = vec![inner.clone(), inner];
    assert_eq!(roundtrip(&value), Some(value));
}

#[test]
fn test_system_time_keeps_microseconds() {
    let time = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_000);
    assert_eq!(roundtrip(&time), Some(time));
}

#[test]
fn test_sorted_map_and_ranges() {
    let mut value = BTreeMap::new();
    value.insert(1u8, 10i64..20);
    value.insert(2u8, 0i64..5);
    assert_eq!(roundtrip(&value), Some(value));
}

#[test]
fn test_numeric_narrowing_on_plain_keys() {
    let suite = Suite::in_memory();
    let small = Key::new("small", &suite, 0i8).unwrap();

    // a wider write of a fitting value narrows on read
    suite.set_raw("small", Some(Storable::Int(100)));
    assert_eq!(small.get(), 100);

    // out of range degrades to the default
    suite.set_raw("small", Some(Storable::Int(300)));
    assert_eq!(small.get(), 0);
}

#[test]
fn test_url_key_stores_string_form() {
    let suite = Suite::in_memory();
    let fallback = url::Url::parse("https://example.com/").unwrap();
    let homepage = Key::new("homepage", &suite, fallback.clone()).unwrap();

    let updated = url::Url::parse("https://example.com/docs?page=2").unwrap();
    homepage.set(updated.clone());
    assert_eq!(homepage.get(), updated);
    assert_eq!(
        suite.get_raw("homepage"),
        Some(Storable::String(updated.as_str().to_owned()))
    );

    // a stored entry that no longer parses falls back to the default
    suite.set_raw("homepage", Some(Storable::String("::garbage::".into())));
    assert_eq!(homepage.get(), fallback);
}

// A dedup-on-insert membership wrapper, rebuilt element by element.
#[derive(Clone, Debug, PartialEq, Default)]
struct TagSet(Vec<String>);

impl TagSet {
    fn insert(&mut self, tag: String) {
        if let Err(slot) = self.0.binary_search(&tag) {
            self.0.insert(slot, tag);
        }
    }
}

impl prefstore::SetAlgebraSerializable for TagSet {
    type Element = String;

    fn from_elements(elements: Vec<String>) -> Self {
        let mut tags = TagSet::default();
        for tag in elements {
            tags.insert(tag);
        }
        tags
    }

    fn elements(&self) -> Vec<&String> {
        self.0.iter().collect()
    }
}

impl Serializable for TagSet {
    type Bridge = prefstore::SetAlgebraBridge<TagSet>;
}

#[test]
fn test_set_algebra_key_deduplicates_stored_elements() {
    let suite = Suite::in_memory();
    let tags = Key::new("tags", &suite, TagSet::default()).unwrap();

    let mut value = TagSet::default();
    value.insert("beta".into());
    value.insert("alpha".into());
    tags.set(value.clone());
    assert_eq!(tags.get(), value);

    // duplicates written behind the key's back collapse into membership
    suite.set_raw(
        "tags",
        Some(Storable::Array(vec![
            Storable::String("alpha".into()),
            Storable::String("alpha".into()),
            Storable::String("beta".into()),
        ])),
    );
    assert_eq!(tags.get(), value);
}

// --- Type-Erased Values Through a Suite ---

#[test]
fn test_any_value_key_roundtrip() {
    let suite = Suite::in_memory();
    let key = Key::new("flexible", &suite, AnyValue::from(0i64)).unwrap();

    key.set(AnyValue::from("hello"));
    assert_eq!(key.get(), AnyValue::from("hello"));

    key.set(AnyValue::from(3u8));
    let value = key.get();
    assert_eq!(value.tag(), TypeTag::UInt8);
    assert_eq!(value.get::<u8>(), Some(3));
    assert_eq!(value.get::<u16>(), None);
}

#[test]
fn test_heterogeneous_array_persists() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("prefs.json");

    let mixed = AnyValue::Array(vec![
        AnyValue::from(true),
        AnyValue::from(-7i32),
        AnyValue::from("text"),
        AnyValue::from(2.5f64),
    ]);

    {
        let suite = Suite::open(&path).unwrap();
        let key = Key::new("mixed", &suite, AnyValue::Array(vec![])).unwrap();
        key.set(mixed.clone());
    }

    let suite = Suite::open(&path).unwrap();
    let key = Key::new("mixed", &suite, AnyValue::Array(vec![])).unwrap();
    assert_eq!(key.get(), mixed);
}

#[test]
fn test_untagged_entry_classified_on_read() {
    let suite = Suite::in_memory();
    suite.set_raw("legacy", Some(Storable::Int(12)));

    let key = Key::new("legacy", &suite, AnyValue::from(0i64)).unwrap();
    assert_eq!(key.get(), AnyValue::Int64(12));
}

// --- Property Tests ---

proptest! {
    #[test]
    fn prop_i64_roundtrip(value: i64) {
        prop_assert_eq!(roundtrip(&value), Some(value));
    }

    #[test]
    fn prop_u32_roundtrip(value: u32) {
        prop_assert_eq!(roundtrip(&value), Some(value));
    }

    #[test]
    fn prop_f64_roundtrip(value: f64) {
        let back = roundtrip(&value).unwrap();
        prop_assert_eq!(back.to_bits(), value.to_bits());
    }

    #[test]
    fn prop_string_roundtrip(value: String) {
        prop_assert_eq!(roundtrip(&value), Some(value));
    }

    #[test]
    fn prop_optional_list_roundtrip(value: Option<Vec<i64>>) {
        match &value {
            // Option round-trips through presence, not through a marker
            None => {
                let bridge = Option::<Vec<i64>>::bridge();
                prop_assert_eq!(bridge.serialize(Some(&value)), None);
                prop_assert_eq!(bridge.deserialize(None), Some(None));
            }
            Some(_) => prop_assert_eq!(roundtrip(&value), Some(value)),
        }
    }

    #[test]
    fn prop_string_set_roundtrip(value: HashSet<String>) {
        prop_assert_eq!(roundtrip(&value), Some(value));
    }

    #[test]
    fn prop_any_int_envelope_roundtrip(value: i64) {
        let boxed = AnyValue::from(value);
        prop_assert_eq!(AnyValue::from_json(&boxed.to_json()), Some(boxed));
    }

    #[test]
    fn prop_any_string_envelope_roundtrip(value: String) {
        let boxed = AnyValue::from(value);
        prop_assert_eq!(AnyValue::from_json(&boxed.to_json()), Some(boxed));
    }

    #[test]
    fn prop_key_set_get_identity(value: i64) {
        let suite = Suite::in_memory();
        let key = Key::new("value", &suite, 0i64).unwrap();
        key.set(value);
        prop_assert_eq!(key.get(), value);
    }
}
