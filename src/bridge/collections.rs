//! Bridges for optional values, collections and maps.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::{Range, RangeInclusive};
use std::str::FromStr;

use super::{Bridge, Serializable};
use crate::types::Storable;

/// Transparent bridge for `Option<T>`.
///
/// `None` serializes to "remove the entry"; a present value delegates to
/// `T`'s bridge. On the way back, absence is a legitimate `None`, while a
/// present-but-undecodable raw value is a decode failure (the caller falls
/// back to the key default).
pub struct OptionBridge<T>(PhantomData<T>);

impl<T> Default for OptionBridge<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Serializable> Bridge for OptionBridge<T> {
    type Value = Option<T>;

    fn serialize(&self, value: Option<&Option<T>>) -> Option<Storable> {
        T::bridge().serialize(value.and_then(Option::as_ref))
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<Option<T>> {
        match raw {
            None => Some(None),
            Some(raw) => T::bridge().deserialize(Some(raw)).map(Some),
        }
    }
}

impl<T: Serializable> Serializable for Option<T> {
    type Bridge = OptionBridge<T>;
}

fn serialize_elements<'a, T, I>(elements: I) -> Option<Storable>
where
    T: Serializable + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let bridge = T::bridge();
    let raw: Option<Vec<Storable>> = elements
        .into_iter()
        .map(|element| bridge.serialize(Some(element)))
        .collect();
    raw.map(Storable::Array)
}

fn deserialize_elements<T: Serializable>(raw: Option<&Storable>) -> Option<Vec<T>> {
    let bridge = T::bridge();
    raw?.as_array()?
        .iter()
        .map(|element| bridge.deserialize(Some(element)))
        .collect()
}

/// Bridge for `Vec<T>`: an array of the element's storable form.
pub struct ArrayBridge<T>(PhantomData<T>);

impl<T> Default for ArrayBridge<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Serializable> Bridge for ArrayBridge<T> {
    type Value = Vec<T>;

    fn serialize(&self, value: Option<&Vec<T>>) -> Option<Storable> {
        serialize_elements(value?)
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<Vec<T>> {
        deserialize_elements(raw)
    }
}

impl<T: Serializable> Serializable for Vec<T> {
    type Bridge = ArrayBridge<T>;
}

/// Bridge for `HashSet<T>`: an array of the element's storable form.
/// Element order in the stored array is unspecified.
pub struct SetBridge<T>(PhantomData<T>);

impl<T> Default for SetBridge<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Serializable + Eq + Hash> Bridge for SetBridge<T> {
    type Value = HashSet<T>;

    fn serialize(&self, value: Option<&HashSet<T>>) -> Option<Storable> {
        serialize_elements(value?)
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<HashSet<T>> {
        deserialize_elements(raw).map(Vec::into_iter).map(Iterator::collect)
    }
}

impl<T: Serializable + Eq + Hash> Serializable for HashSet<T> {
    type Bridge = SetBridge<T>;
}

/// An ordered sequence type that can be rebuilt from an array of elements.
///
/// The constructor is fallible: a fixed-capacity wrapper may reject an
/// element list of the wrong length, in which case the stored value degrades
/// to "no value" for the reading key.
pub trait CollectionSerializable: Sized {
    type Element: Serializable;

    fn from_elements(elements: Vec<Self::Element>) -> Option<Self>;

    fn elements(&self) -> Vec<&Self::Element>;
}

/// Bridge for [`CollectionSerializable`] types.
pub struct CollectionBridge<C>(PhantomData<C>);

impl<C> Default for CollectionBridge<C> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<C: CollectionSerializable> Bridge for CollectionBridge<C> {
    type Value = C;

    fn serialize(&self, value: Option<&C>) -> Option<Storable> {
        serialize_elements(value?.elements())
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<C> {
        deserialize_elements(raw).and_then(C::from_elements)
    }
}

/// An unordered unique-membership container rebuilt by inserting elements.
pub trait SetAlgebraSerializable: Sized {
    type Element: Serializable;

    fn from_elements(elements: Vec<Self::Element>) -> Self;

    fn elements(&self) -> Vec<&Self::Element>;
}

/// Bridge for [`SetAlgebraSerializable`] types.
pub struct SetAlgebraBridge<C>(PhantomData<C>);

impl<C> Default for SetAlgebraBridge<C> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<C: SetAlgebraSerializable> Bridge for SetAlgebraBridge<C> {
    type Value = C;

    fn serialize(&self, value: Option<&C>) -> Option<Storable> {
        serialize_elements(value?.elements())
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<C> {
        deserialize_elements(raw).map(C::from_elements)
    }
}

/// Bridge for string-keyed maps: a map of the value's storable form.
///
/// Keys only need to convert losslessly to and from strings; a key that
/// fails to parse back makes the whole map decode as "no value".
pub struct DictionaryBridge<K, V>(PhantomData<(K, V)>);

impl<K, V> Default for DictionaryBridge<K, V> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

fn serialize_entries<'a, K, V, I>(entries: I) -> Option<Storable>
where
    K: Display + 'a,
    V: Serializable + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    let bridge = V::bridge();
    let mut raw = BTreeMap::new();
    for (key, value) in entries {
        raw.insert(key.to_string(), bridge.serialize(Some(value))?);
    }
    Some(Storable::Map(raw))
}

fn deserialize_entries<K, V>(raw: Option<&Storable>) -> Option<Vec<(K, V)>>
where
    K: FromStr,
    V: Serializable,
{
    let bridge = V::bridge();
    raw?.as_map()?
        .iter()
        .map(|(key, value)| {
            let key = K::from_str(key).ok()?;
            let value = bridge.deserialize(Some(value))?;
            Some((key, value))
        })
        .collect()
}

impl<K, V> Bridge for DictionaryBridge<K, V>
where
    K: Display + FromStr + Eq + Hash,
    V: Serializable,
{
    type Value = HashMap<K, V>;

    fn serialize(&self, value: Option<&HashMap<K, V>>) -> Option<Storable> {
        serialize_entries(value?)
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<HashMap<K, V>> {
        deserialize_entries(raw).map(Vec::into_iter).map(Iterator::collect)
    }
}

impl<K, V> Serializable for HashMap<K, V>
where
    K: Display + FromStr + Eq + Hash,
    V: Serializable,
{
    type Bridge = DictionaryBridge<K, V>;
}

/// [`DictionaryBridge`] for ordered maps.
pub struct SortedDictionaryBridge<K, V>(PhantomData<(K, V)>);

impl<K, V> Default for SortedDictionaryBridge<K, V> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<K, V> Bridge for SortedDictionaryBridge<K, V>
where
    K: Display + FromStr + Ord,
    V: Serializable,
{
    type Value = BTreeMap<K, V>;

    fn serialize(&self, value: Option<&BTreeMap<K, V>>) -> Option<Storable> {
        serialize_entries(value?)
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<BTreeMap<K, V>> {
        deserialize_entries(raw).map(Vec::into_iter).map(Iterator::collect)
    }
}

impl<K, V> Serializable for BTreeMap<K, V>
where
    K: Display + FromStr + Ord,
    V: Serializable,
{
    type Bridge = SortedDictionaryBridge<K, V>;
}

/// Bridge for half-open ranges: a two-element `[start, end]` array.
pub struct RangeBridge<T>(PhantomData<T>);

impl<T> Default for RangeBridge<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

fn serialize_bounds<T: Serializable>(start: &T, end: &T) -> Option<Storable> {
    let bridge = T::bridge();
    Some(Storable::Array(vec![
        bridge.serialize(Some(start))?,
        bridge.serialize(Some(end))?,
    ]))
}

fn deserialize_bounds<T: Serializable>(raw: Option<&Storable>) -> Option<(T, T)> {
    let bridge = T::bridge();
    match raw?.as_array()? {
        [start, end] => Some((
            bridge.deserialize(Some(start))?,
            bridge.deserialize(Some(end))?,
        )),
        _ => None,
    }
}

impl<T: Serializable> Bridge for RangeBridge<T> {
    type Value = Range<T>;

    fn serialize(&self, value: Option<&Range<T>>) -> Option<Storable> {
        let range = value?;
        serialize_bounds(&range.start, &range.end)
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<Range<T>> {
        deserialize_bounds(raw).map(|(start, end)| start..end)
    }
}

impl<T: Serializable> Serializable for Range<T> {
    type Bridge = RangeBridge<T>;
}

/// Bridge for closed ranges: a two-element `[start, end]` array.
pub struct RangeInclusiveBridge<T>(PhantomData<T>);

impl<T> Default for RangeInclusiveBridge<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Serializable> Bridge for RangeInclusiveBridge<T> {
    type Value = RangeInclusive<T>;

    fn serialize(&self, value: Option<&RangeInclusive<T>>) -> Option<Storable> {
        let range = value?;
        serialize_bounds(range.start(), range.end())
    }

    fn deserialize(&self, raw: Option<&Storable>) -> Option<RangeInclusive<T>> {
        deserialize_bounds(raw).map(|(start, end)| start..=end)
    }
}

impl<T: Serializable> Serializable for RangeInclusive<T> {
    type Bridge = RangeInclusiveBridge<T>;
}
