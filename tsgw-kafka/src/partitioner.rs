use std::hash::Hasher as _;

use hash32::{FnvHasher, Hasher as _};
use tsgw_schema::MetricData;

use crate::{ConfigError, PartitionScheme};

/// Assigns metrics to partitions of the metrics topic.
///
/// The assignment is a pure function of the scheme, the metric and the partition count. It
/// matches the hash partitioner of the Kafka clients used by downstream consumers: FNV-1a over
/// the partition key, reinterpreted as a signed 32 bit integer, modulo the partition count.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Partitioner {
    scheme: PartitionScheme,
    partition_count: i32,
}

impl Partitioner {
    /// Creates a partitioner for a topic with `partition_count` partitions.
    pub fn new(scheme: PartitionScheme, partition_count: i32) -> Result<Self, ConfigError> {
        if partition_count < 1 {
            return Err(ConfigError::InvalidPartitionCount(partition_count));
        }

        Ok(Self {
            scheme,
            partition_count,
        })
    }

    /// The configured scheme.
    pub fn scheme(&self) -> PartitionScheme {
        self.scheme
    }

    /// The number of partitions of the topic.
    pub fn partition_count(&self) -> i32 {
        self.partition_count
    }

    /// Appends the partition key of `metric` to `buf`.
    pub fn partition_key(&self, metric: &MetricData, buf: &mut Vec<u8>) {
        match self.scheme {
            PartitionScheme::ByOrg => metric.key_by_org(buf),
            PartitionScheme::BySeries => metric.key_by_series(buf),
            PartitionScheme::BySeriesWithTags => metric.key_by_series_with_tags(buf),
        }
    }

    /// Returns the partition of `metric` along with its partition key.
    pub fn partition(&self, metric: &MetricData) -> (i32, Vec<u8>) {
        let mut key = Vec::new();
        self.partition_key(metric, &mut key);
        (self.partition_for_key(&key), key)
    }

    /// Returns the partition of a raw partition key.
    pub fn partition_for_key(&self, key: &[u8]) -> i32 {
        let mut hasher = FnvHasher::default();
        hasher.write(key);
        let hash = hasher.finish32() as i32;
        (hash % self.partition_count).abs()
    }
}
