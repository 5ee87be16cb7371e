//! Types describing metrics as they travel through the gateway.
//!
//! A metric arrives as [`MetricData`], the full description of one sample including its name,
//! unit, tags and resolution. Every distinct series is identified by a content hash, the
//! [`SeriesKey`], which together with the owning organization forms a [`MetricKey`]. Once a
//! series is known downstream, samples can be shipped as a much smaller [`MetricPoint`] that
//! only carries the key, the value and the timestamp.
//!
//! [`StorageSchemas`] map metric names to their retention policies. They are used to resolve
//! the interval of metrics that arrive without one.
#![warn(missing_docs)]

mod error;
mod key;
mod metric;
mod organization;
mod point;
mod storage;

pub use self::error::*;
pub use self::key::*;
pub use self::metric::*;
pub use self::organization::*;
pub use self::point::*;
pub use self::storage::*;
