//! Tracks which series have recently been seen, per organization.
//!
//! The gateway sends the full description of a series only when it has not been seen for a
//! while and a compact point otherwise. [`KeyCache::touch`] answers the question "was this
//! series seen before?" and records the sighting at the same time.
//!
//! # Memory layout
//!
//! Every organization owns a [`Cache`] that is split into lock-striped [`Shard`]s, selected by
//! the leading byte of the series key. A shard stores the remaining 15 bytes as [`SubKey`] and
//! remembers the last sighting as a single byte [`Age`], counted in ten minute buckets from the
//! shard's [`Ref`]. Since a byte only spans about 42 hours, the reference of every shard is
//! moved forward by the periodic prune, which also expires entries older than the stale
//! threshold. A touch that lands beyond the horizon moves the reference itself.
//!
//! # Pruning
//!
//! Pruning runs on a background thread started with [`KeyCache::spawn_pruner`]. The thread is
//! stopped when the returned [`PrunerHandle`] is dropped. [`KeyCache::prune`] can also be called
//! directly, which is what tests do with a simulated clock.
#![warn(missing_docs)]

mod age;
mod cache;
mod config;
mod error;
mod org;
mod pruner;
mod shard;
mod statsd;

pub use self::age::*;
pub use self::cache::*;
pub use self::config::*;
pub use self::error::*;
pub use self::org::*;
pub use self::pruner::*;
pub use self::shard::*;
