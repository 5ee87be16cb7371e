//! Publishing of metric batches to a partitioned broker.
//!
//! The [`Publisher`] turns a batch of [`MetricData`] into broker messages. Series that were
//! described recently are sent as compact [`MetricPoint`](tsgw_schema::MetricPoint)s, all
//! others as full MessagePack documents. Every message of a series lands on the same
//! partition, as decided by the [`Partitioner`](tsgw_kafka::Partitioner).
//!
//! A call to [`Publish::publish`] blocks until the broker has reported the outcome of every
//! submitted message. The first failure is returned, but the remaining reports are still
//! collected so no report outlives its batch.
//!
//! # Encodings
//!
//! | encoding             | first byte | size      | when                                  |
//! |----------------------|------------|-----------|---------------------------------------|
//! | full                 | map header | variable  | series not seen within the threshold  |
//! | compact with org     | `2`        | 33 bytes  | series seen recently                  |
//! | compact without org  | `3`        | 29 bytes  | series seen recently, org omitted     |
//!
//! When publishing is disabled, the [`NullPublisher`] takes the place of the publisher and
//! drops every batch.
#![warn(missing_docs)]

mod buffer;
mod error;
mod null;
mod publisher;
mod statsd;

use tsgw_schema::MetricData;
use tsgw_statsd::metric;

pub use self::buffer::*;
pub use self::error::*;
pub use self::null::*;
pub use self::publisher::*;

use crate::statsd::PublishCounters;

/// A sink for batches of metrics.
pub trait Publish: Send + Sync {
    /// Publishes a batch of metrics.
    ///
    /// Metrics without an interval are resolved in place, which also assigns their id.
    fn publish(&self, metrics: &mut [MetricData]) -> Result<(), PublishError>;

    /// A short name of the publisher for logs.
    fn kind(&self) -> &'static str;
}

/// Publishes a batch through `publisher` and records the number of ingested samples.
///
/// This is the entry point for ingestion front-ends. Empty batches are ignored.
pub fn publish(publisher: &dyn Publish, metrics: &mut [MetricData]) -> Result<(), PublishError> {
    if metrics.is_empty() {
        return Ok(());
    }

    metric!(counter(PublishCounters::SamplesIngested) += metrics.len() as i64);
    publisher.publish(metrics)
}
