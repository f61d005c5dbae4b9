//! Suites: isolated, string-keyed value partitions.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::observation::{
    Handler, Observation, ObservationOptions, ObservationRegistry, PropagationScope, RawChange,
};
use crate::types::Storable;

/// Current suite file format version.
const SUITE_VERSION: u8 = 1;

/// On-disk envelope for a persistent suite.
#[derive(Serialize, Deserialize)]
struct SuiteFile {
    version: u8,
    values: BTreeMap<String, Storable>,
}

struct Persistence {
    path: PathBuf,
    /// Held for the lifetime of the suite.
    _lock_file: File,
}

struct SuiteInner {
    id: Uuid,
    /// Stored entries. Never read while handlers run.
    values: RwLock<BTreeMap<String, Storable>>,
    /// Registration domain: fallback defaults consulted on read misses.
    /// Separate from `values` so `remove`/`remove_all` cannot erase it.
    /// Never persisted.
    registered: RwLock<BTreeMap<String, Storable>>,
    registry: Arc<ObservationRegistry>,
    persistence: Option<Persistence>,
    /// Serializes mutation + file rewrite ordering across writers.
    write_lock: Mutex<()>,
}

/// A cheap-clone handle to one value partition.
///
/// Every mutation broadcasts a raw before/after change to the suite's
/// observers. After-change handlers run synchronously on the writing thread
/// with no suite lock held, so they may write back freely. Prior deliveries
/// happen inside the write path and must not mutate the suite.
#[derive(Clone)]
pub struct Suite {
    inner: Arc<SuiteInner>,
}

impl Suite {
    /// A suite with no backing file. Contents vanish with the last handle.
    pub fn in_memory() -> Self {
        Self::with_persistence(None, BTreeMap::new())
    }

    /// Opens a file-backed suite, creating the file's directory if needed.
    ///
    /// The file is a versioned JSON envelope, rewritten atomically on every
    /// mutation. A sibling `.lock` file holds an exclusive lock for the
    /// lifetime of the suite; a second opener gets [`StoreError::Locked`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = File::create(path.with_extension("lock"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        let values = if path.exists() {
            let data = fs::read(&path)?;
            let file: SuiteFile = serde_json::from_slice(&data)
                .map_err(|e| StoreError::InvalidFormat(e.to_string()))?;
            if file.version > SUITE_VERSION {
                return Err(StoreError::InvalidFormat(format!(
                    "unsupported suite version: {}",
                    file.version
                )));
            }
            file.values
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), entries = values.len(), "opened suite");

        Ok(Self::with_persistence(
            Some(Persistence {
                path,
                _lock_file: lock_file,
            }),
            values,
        ))
    }

    fn with_persistence(
        persistence: Option<Persistence>,
        values: BTreeMap<String, Storable>,
    ) -> Self {
        Self {
            inner: Arc::new(SuiteInner {
                id: Uuid::new_v4(),
                values: RwLock::new(values),
                registered: RwLock::new(BTreeMap::new()),
                registry: Arc::new(ObservationRegistry::new()),
                persistence,
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Process-unique suite identity.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn is_persistent(&self) -> bool {
        self.inner.persistence.is_some()
    }

    /// Reads the raw value for `key`, falling back to the registration
    /// domain when no entry is stored.
    pub fn get_raw(&self, key: &str) -> Option<Storable> {
        if let Some(value) = self.inner.values.read().get(key) {
            return Some(value.clone());
        }
        self.inner.registered.read().get(key).cloned()
    }

    /// True if an entry is stored for `key` (registered defaults excluded).
    pub fn contains(&self, key: &str) -> bool {
        self.inner.values.read().contains_key(key)
    }

    /// Names of all stored entries.
    pub fn keys(&self) -> Vec<String> {
        self.inner.values.read().keys().cloned().collect()
    }

    /// Writes or removes the raw entry for `key` and notifies observers.
    ///
    /// `None` removes the entry. The write's suppression set is the delivery
    /// context of the calling thread, so a handler writing back never
    /// re-enters itself.
    ///
    /// The old value is captured inside the write path, so concurrent writers
    /// to the same key produce change records that chain: each record's old
    /// value is the previous record's new value. Prior deliveries run while
    /// the write path is held; a prior handler must not write back into the
    /// suite.
    pub fn set_raw(&self, key: &str, new_value: Option<Storable>) {
        let suppressed = PropagationScope::current();

        let old_value = {
            let _write = self.inner.write_lock.lock();
            let old_value = self.inner.values.read().get(key).cloned();
            if old_value.is_none() && new_value.is_none() {
                return;
            }

            self.inner.registry.broadcast(
                &[RawChange {
                    key: key.to_string(),
                    old_value: old_value.clone(),
                    new_value: new_value.clone(),
                    is_prior: true,
                }],
                suppressed.ids(),
            );

            let snapshot = {
                let mut values = self.inner.values.write();
                match &new_value {
                    Some(value) => {
                        values.insert(key.to_string(), value.clone());
                    }
                    None => {
                        values.remove(key);
                    }
                }
                self.inner.persistence.is_some().then(|| values.clone())
            };
            if let Some(snapshot) = snapshot {
                self.persist(snapshot);
            }
            old_value
        };

        self.inner.registry.broadcast(
            &[RawChange {
                key: key.to_string(),
                old_value,
                new_value,
                is_prior: false,
            }],
            suppressed.ids(),
        );
    }

    /// Removes the entry for `key`, if any.
    pub fn remove(&self, key: &str) {
        self.set_raw(key, None);
    }

    /// Removes every stored entry in one mutation. Registered defaults
    /// survive. A multi-key observer fires once.
    pub fn remove_all(&self) {
        let suppressed = PropagationScope::current();

        let after = {
            let _write = self.inner.write_lock.lock();
            let old_entries: Vec<(String, Storable)> = self
                .inner
                .values
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if old_entries.is_empty() {
                return;
            }

            let changes = |is_prior: bool| -> Vec<RawChange> {
                old_entries
                    .iter()
                    .map(|(key, old)| RawChange {
                        key: key.clone(),
                        old_value: Some(old.clone()),
                        new_value: None,
                        is_prior,
                    })
                    .collect()
            };

            self.inner.registry.broadcast(&changes(true), suppressed.ids());

            self.inner.values.write().clear();
            if self.inner.persistence.is_some() {
                self.persist(BTreeMap::new());
            }
            changes(false)
        };

        self.inner.registry.broadcast(&after, suppressed.ids());
    }

    /// Removes the named entries, each independently.
    pub fn reset_names(&self, names: &[&str]) {
        for name in names {
            self.remove(name);
        }
    }

    /// Installs a fallback default for `key` in the registration domain.
    pub fn register_default(&self, key: &str, value: Storable) {
        self.inner.registered.write().insert(key.to_string(), value);
    }

    /// Observes mutations to any of `names`. The handler fires once per
    /// mutation touching the set, however many member keys that mutation
    /// changed.
    pub fn observe_keys(
        &self,
        names: &[&str],
        options: ObservationOptions,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> Observation {
        let keys: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        self.observe_raw(keys, options, Arc::new(move |_| handler()))
    }

    /// Registers a raw observer. With the initial option, one synthesized
    /// delivery (old == new == current) is made before this returns.
    pub(crate) fn observe_raw(
        &self,
        keys: Vec<String>,
        options: ObservationOptions,
        handler: Handler,
    ) -> Observation {
        let key_set: HashSet<String> = keys.iter().cloned().collect();
        let (id, active) = self.inner.registry.insert(key_set, options, handler);
        let observation = Observation::new(id, &self.inner.registry, active);

        if options.initial {
            let changes: Vec<RawChange> = keys
                .into_iter()
                .map(|key| {
                    let current = self.get_raw(&key);
                    RawChange {
                        key,
                        old_value: current.clone(),
                        new_value: current,
                        is_prior: false,
                    }
                })
                .collect();
            self.inner.registry.deliver_to(id, &changes);
        }

        observation
    }

    /// Number of registered observations.
    pub fn observation_count(&self) -> usize {
        self.inner.registry.observation_count()
    }

    /// Atomic rewrite: temp file in the same directory, then rename over.
    /// A failed rewrite keeps the in-memory state and is logged, not raised.
    fn persist(&self, values: BTreeMap<String, Storable>) {
        let Some(persistence) = &self.inner.persistence else {
            return;
        };
        let result = (|| -> Result<()> {
            let file = SuiteFile {
                version: SUITE_VERSION,
                values,
            };
            let data = serde_json::to_vec_pretty(&file)?;
            let tmp = persistence.path.with_extension("tmp");
            fs::write(&tmp, &data)?;
            fs::rename(&tmp, &persistence.path)?;
            Ok(())
        })();
        if let Err(error) = result {
            tracing::warn!(path = %persistence.path.display(), %error, "failed to persist suite");
        }
    }
}

impl PartialEq for Suite {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Suite {}

impl std::hash::Hash for Suite {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl std::fmt::Debug for Suite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suite")
            .field("id", &self.inner.id)
            .field("persistent", &self.inner.persistence.is_some())
            .finish()
    }
}
