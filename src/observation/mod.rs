//! Observation system for key change notifications.
//!
//! Observations attach a handler to one or many keys of a suite:
//! - single-key observers receive typed before/after pairs
//! - multi-key observers fire once per mutation touching any of their keys
//! - the *initial* option synthesizes a delivery at subscription time
//! - the *prior* option also delivers just before each mutation lands
//!
//! A handler may write back to the suite. Such writes never re-enter the
//! handler that performed them, but still land in the store and still reach
//! every other observer. The correlation is per delivery, carried by
//! [`PropagationScope`] when a handler moves work to another thread.
//!
//! # Example
//!
//! ```ignore
//! let suite = Suite::in_memory();
//! let volume = Key::new("volume", &suite, 50i64)?;
//!
//! let observation = volume.observe(ObservationOptions::default(), |change| {
//!     println!("{} -> {}", change.old_value, change.new_value);
//! });
//!
//! volume.set(80)?;
//! observation.invalidate();
//! ```

mod registry;
mod stream;
mod types;

pub use registry::{Observation, ObservationRegistry, PropagationScope};
pub use stream::{ChangeStream, DedupedStream};
pub use types::{ChangeRecord, ObservationId, ObservationOptions};

pub(crate) use registry::Handler;
pub(crate) use stream::STREAM_BUFFER;
pub(crate) use types::RawChange;
