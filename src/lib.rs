//! # prefstore
//!
//! A typed persistence layer over string-keyed suites: strongly-typed keys
//! with defaults, a serialization bridge engine for converting rich values
//! to the primitive shapes a suite can store, and change observation with
//! feedback-loop suppression.
//!
//! ## Core Concepts
//!
//! - **Suites**: isolated string-keyed partitions, in-memory or file-backed
//! - **Keys**: named typed accessors with static or lazily-produced defaults
//! - **Bridges**: stateless converters between typed values and raw storage
//! - **Observations**: per-key change delivery that never re-enters the
//!   handler that caused the write
//!
//! ## Example
//!
//! ```ignore
//! use prefstore::{Key, ObservationOptions, Suite};
//!
//! let suite = Suite::open("./prefs.json")?;
//! let volume = Key::new("volume", &suite, 50i64)?;
//!
//! let observation = volume.observe(ObservationOptions::default(), |change| {
//!     println!("volume: {} -> {}", change.old_value, change.new_value);
//! });
//!
//! volume.set(80);
//! assert_eq!(volume.get(), 80);
//! volume.reset();
//! assert_eq!(volume.get(), 50);
//! ```

pub mod any;
pub mod bridge;
pub mod error;
pub mod key;
pub mod migration;
pub mod observation;
pub mod suite;
pub mod types;

// Re-exports
pub use any::{AnyBridge, AnyConvertible, AnyValue, TypeTag};
pub use bridge::{
    ArchiveBridge, ArrayBridge, Bridge, CollectionBridge, CollectionSerializable,
    DictionaryBridge, JsonBridge, NativeBridge, NativeValue, OptionBridge, RangeBridge,
    RangeInclusiveBridge, RawValue, RawValueBridge, Serializable, SetAlgebraBridge,
    SetAlgebraSerializable, SetBridge, SortedDictionaryBridge,
};
pub use error::{Result, StoreError};
pub use key::{is_valid_key_name, reset_keys, DynKey, Key};
pub use migration::{
    migrate, migrate_keys, CodableType, MigratableKey, MigrationOutcome, NativeType, SetForm,
    Version,
};
pub use observation::{
    ChangeRecord, ChangeStream, DedupedStream, Observation, ObservationId, ObservationOptions,
    ObservationRegistry, PropagationScope,
};
pub use suite::Suite;
pub use types::{Storable, Timestamp};
