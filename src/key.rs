//! Typed keys over a suite.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bridge::{Bridge, Serializable};
use crate::error::{Result, StoreError};
use crate::observation::{
    ChangeRecord, ChangeStream, Observation, ObservationOptions, RawChange, STREAM_BUFFER,
};
use crate::suite::Suite;
use crate::types::Storable;

/// `.` breaks key-path style lookups in external inspection tools and a
/// leading `@` collides with reserved names in common suite backends.
pub fn is_valid_key_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.') && !name.starts_with('@')
}

fn validate_key_name(name: &str) -> Result<()> {
    if is_valid_key_name(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidKeyName(name.to_string()))
    }
}

enum DefaultSource<T> {
    Static(T),
    Lazy {
        producer: Box<dyn Fn() -> T + Send + Sync>,
        /// Evaluated at most once between resets.
        cached: Mutex<Option<T>>,
    },
}

struct KeyInner<T> {
    name: String,
    suite: Suite,
    default: DefaultSource<T>,
}

/// A named, typed accessor into one suite.
///
/// Cheap to clone; equality and hashing are by (name, suite), so two handles
/// to the same entry compare equal.
pub struct Key<T: Serializable> {
    inner: Arc<KeyInner<T>>,
}

impl<T: Serializable> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Serializable> Key<T> {
    /// A key with a static default. The default is registered into the
    /// suite's registration domain immediately, so external inspection sees
    /// it before the first read.
    pub fn new(name: impl Into<String>, suite: &Suite, default: T) -> Result<Self> {
        let name = name.into();
        validate_key_name(&name)?;

        if let Some(raw) = T::bridge().serialize(Some(&default)) {
            suite.register_default(&name, raw);
        }

        Ok(Self {
            inner: Arc::new(KeyInner {
                name,
                suite: suite.clone(),
                default: DefaultSource::Static(default),
            }),
        })
    }

    /// A key whose default is produced on first miss and cached until the
    /// next reset. The producer is not run at construction and nothing is
    /// registered into the suite.
    pub fn lazy(
        name: impl Into<String>,
        suite: &Suite,
        producer: impl Fn() -> T + Send + Sync + 'static,
    ) -> Result<Self> {
        let name = name.into();
        validate_key_name(&name)?;

        Ok(Self {
            inner: Arc::new(KeyInner {
                name,
                suite: suite.clone(),
                default: DefaultSource::Lazy {
                    producer: Box::new(producer),
                    cached: Mutex::new(None),
                },
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn suite(&self) -> &Suite {
        &self.inner.suite
    }
}

impl<T: Serializable + Clone> Key<T> {
    /// The key's default, evaluating and caching a lazy producer.
    pub fn default_value(&self) -> T {
        match &self.inner.default {
            DefaultSource::Static(value) => value.clone(),
            DefaultSource::Lazy { producer, cached } => {
                let mut cached = cached.lock();
                cached.get_or_insert_with(producer).clone()
            }
        }
    }

    /// Reads the current value. Absent or undecodable entries yield the
    /// default; reads never fail.
    pub fn get(&self) -> T {
        match self.inner.suite.get_raw(&self.inner.name) {
            Some(raw) => T::bridge()
                .deserialize(Some(&raw))
                .unwrap_or_else(|| self.default_value()),
            None => self.default_value(),
        }
    }

    /// Writes a value. A value that bridges to "no raw form" (an `Option`
    /// key set to `None`) removes the entry instead of storing a marker.
    pub fn set(&self, value: T) {
        let raw = T::bridge().serialize(Some(&value));
        self.inner.suite.set_raw(&self.inner.name, raw);
    }

    /// Removes the entry unconditionally. The next `get` recomputes the
    /// default; a lazy producer runs again.
    pub fn reset(&self) {
        if let DefaultSource::Lazy { cached, .. } = &self.inner.default {
            cached.lock().take();
        }
        self.inner.suite.remove(&self.inner.name);
    }

    fn typed(&self, change: &RawChange) -> ChangeRecord<T> {
        let resolve = |raw: &Option<Storable>| match raw {
            Some(raw) => T::bridge()
                .deserialize(Some(raw))
                .unwrap_or_else(|| self.default_value()),
            None => self.default_value(),
        };
        ChangeRecord {
            old_value: resolve(&change.old_value),
            new_value: resolve(&change.new_value),
            is_prior: change.is_prior,
        }
    }
}

impl<T: Serializable + Clone + Send + Sync + 'static> Key<T> {
    /// Observes changes to this key. Raw values on both sides of the change
    /// are resolved through the bridge, falling back to the default.
    pub fn observe(
        &self,
        options: ObservationOptions,
        handler: impl Fn(ChangeRecord<T>) + Send + Sync + 'static,
    ) -> Observation {
        let key = self.clone();
        self.inner.suite.observe_raw(
            vec![self.inner.name.clone()],
            options,
            Arc::new(move |changes| {
                for change in changes {
                    handler(key.typed(change));
                }
            }),
        )
    }

    /// A pull-based stream of changes. Dropping the stream invalidates its
    /// observation; a full buffer sheds the newest deliveries.
    pub fn updates(&self, options: ObservationOptions) -> ChangeStream<T> {
        let (sender, receiver) = crossbeam_channel::bounded(STREAM_BUFFER);
        let observation = self.observe(options, move |record| {
            let _ = sender.try_send(record);
        });
        ChangeStream::new(observation, receiver)
    }
}

impl<T: Serializable> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name && self.inner.suite == other.inner.suite
    }
}

impl<T: Serializable> Eq for Key<T> {}

impl<T: Serializable> Hash for Key<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.name.hash(state);
        self.inner.suite.hash(state);
    }
}

impl<T: Serializable> std::fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("name", &self.inner.name)
            .field("suite", &self.inner.suite)
            .finish()
    }
}

/// Object-safe view of a key, for resetting heterogeneous sets.
pub trait DynKey: Send + Sync {
    fn name(&self) -> &str;

    fn suite(&self) -> &Suite;

    fn reset(&self);
}

impl<T: Serializable + Clone + Send + Sync> DynKey for Key<T> {
    fn name(&self) -> &str {
        Key::name(self)
    }

    fn suite(&self) -> &Suite {
        Key::suite(self)
    }

    fn reset(&self) {
        Key::reset(self);
    }
}

/// Resets each key independently; one key's removal never blocks another's.
pub fn reset_keys(keys: &[&dyn DynKey]) {
    for key in keys {
        key.reset();
    }
}
