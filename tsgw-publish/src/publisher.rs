use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tsgw_common::UnixTimestamp;
use tsgw_kafka::{Broker, DeliveryReport, Partitioner, Record};
use tsgw_keycache::KeyCache;
use tsgw_log::LogError;
use tsgw_schema::{MetricData, MetricKey, MetricPoint, PointFormat, StorageSchemas};
use tsgw_statsd::metric;

use crate::buffer::{BufferKind, BufferPools, MessageBatch};
use crate::statsd::{PublishCounters, PublishHistograms, PublishTimers};
use crate::{Publish, PublishError};

/// Options of the [`Publisher`].
#[derive(Clone, Debug)]
pub struct PublisherConfig {
    /// The topic all messages are produced to.
    pub topic: String,
    /// Include the organization id in compact points.
    pub compact_with_org: bool,
    /// Maximum time to wait for the next delivery report. Waits indefinitely if `None`.
    pub ack_timeout: Option<Duration>,
    /// Number of idle buffers retained per encoding.
    pub buffer_pool_size: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic: "mdm".to_owned(),
            compact_with_org: true,
            ack_timeout: None,
            buffer_pool_size: 1024,
        }
    }
}

/// Number of messages per encoding in a batch.
#[derive(Debug, Default)]
struct EncodingCounts {
    full: usize,
    compact: usize,
    compact_without_org: usize,
}

impl EncodingCounts {
    fn emit(&self) {
        metric!(counter(PublishCounters::PublishedFull) += self.full as i64);
        metric!(counter(PublishCounters::PublishedCompact) += self.compact as i64);
        metric!(
            counter(PublishCounters::PublishedCompactWithoutOrg) += self.compact_without_org as i64
        );
    }
}

/// Keeps the first error of a batch and counts all of them.
#[derive(Debug, Default)]
struct Errors {
    first: Option<PublishError>,
    count: usize,
}

impl Errors {
    fn record(&mut self, error: PublishError) {
        if let Some(category) = error.category() {
            metric!(
                counter(PublishCounters::SendError) += 1,
                category = category.as_str()
            );
        }

        self.count += 1;
        if self.first.is_none() {
            self.first = Some(error);
        }
    }
}

/// Publishes batches of metrics to a [`Broker`].
///
/// The publisher owns its buffer pools. The novelty cache is shared, usually with the pruner
/// thread. Without a cache every metric is sent in full.
pub struct Publisher<B> {
    broker: B,
    partitioner: Partitioner,
    schemas: StorageSchemas,
    key_cache: Option<Arc<KeyCache>>,
    pools: BufferPools,
    config: PublisherConfig,
}

impl<B: Broker> Publisher<B> {
    /// Creates a new publisher.
    pub fn new(
        broker: B,
        partitioner: Partitioner,
        schemas: StorageSchemas,
        key_cache: Option<Arc<KeyCache>>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            pools: BufferPools::new(config.buffer_pool_size),
            broker,
            partitioner,
            schemas,
            key_cache,
            config,
        }
    }

    /// Returns the broker this publisher produces to.
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Returns the buffer pools of this publisher.
    pub fn pools(&self) -> &BufferPools {
        &self.pools
    }

    /// Publishes `metrics` as if the current time was `now`.
    ///
    /// `now` drives the novelty cache only, the timestamps of the metrics are not consulted.
    pub fn publish_at(
        &self,
        metrics: &mut [MetricData],
        now: UnixTimestamp,
    ) -> Result<(), PublishError> {
        if metrics.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let keys = self.normalize(metrics)?;

        let mut described = HashSet::new();
        let counts = match self.send(metrics, &keys, now, &mut described) {
            Ok(counts) => counts,
            Err(error) => {
                // Series first described by a failed batch count as unseen again.
                if let Some(cache) = &self.key_cache {
                    for &key in &described {
                        cache.forget(key);
                    }
                }
                return Err(error);
            }
        };

        metric!(timer(PublishTimers::Publish) = start.elapsed());
        counts.emit();
        tsgw_log::debug!(
            full = counts.full,
            compact = counts.compact + counts.compact_without_org,
            "published metrics"
        );

        Ok(())
    }

    /// Encodes and produces a normalized batch and waits for all of its delivery reports.
    ///
    /// Series this batch describes first are added to `described`, also when it fails.
    fn send(
        &self,
        metrics: &[MetricData],
        keys: &[MetricKey],
        now: UnixTimestamp,
        described: &mut HashSet<MetricKey>,
    ) -> Result<EncodingCounts, PublishError> {
        let mut batch = MessageBatch::with_capacity(&self.pools, metrics.len());
        let counts = self.encode(metrics, keys, now, described, &mut batch)?;

        let (reports_tx, reports_rx) = crossbeam_channel::bounded(metrics.len());
        let mut errors = Errors::default();
        let mut submitted = 0;

        for (metric, message) in metrics.iter().zip(batch.messages()) {
            let (partition, key) = self.partitioner.partition(metric);
            metric!(histogram(PublishHistograms::MessageSize) = message.payload.len() as u64);

            let record = Record {
                topic: &self.config.topic,
                partition,
                key: &key,
                payload: &message.payload,
            };

            if let Err(error) = self.broker.produce(record, &reports_tx) {
                errors.record(error.into());
                break;
            }
            submitted += 1;
        }

        // Reports are collected until every message is accounted for. Dropping the sender lets
        // a broker that loses reports surface as a disconnect instead of blocking forever.
        drop(reports_tx);
        self.drain(&reports_rx, submitted, &mut errors);
        drop(batch);

        match errors.first {
            Some(error) => {
                tsgw_log::error!(
                    errors = errors.count,
                    messages = metrics.len(),
                    submitted,
                    "failed to publish batch: {}",
                    LogError(&error)
                );
                Err(error)
            }
            None => Ok(counts),
        }
    }

    /// Resolves missing intervals and parses the series key of every metric.
    fn normalize(&self, metrics: &mut [MetricData]) -> Result<Vec<MetricKey>, PublishError> {
        metrics
            .iter_mut()
            .map(|metric| {
                if metric.interval == 0 {
                    metric.interval = self.schemas.match_name(&metric.name).interval();
                    metric.set_id();
                }
                Ok(metric.metric_key()?)
            })
            .collect()
    }

    /// Encodes every metric into a buffer of `batch`.
    fn encode(
        &self,
        metrics: &[MetricData],
        keys: &[MetricKey],
        now: UnixTimestamp,
        described: &mut HashSet<MetricKey>,
        batch: &mut MessageBatch<'_>,
    ) -> Result<EncodingCounts, PublishError> {
        let mut counts = EncodingCounts::default();
        let format = if self.config.compact_with_org {
            PointFormat::WithOrg
        } else {
            PointFormat::WithoutOrg
        };

        // Series first described by this batch are sent in full for all their samples.
        for (metric, &mkey) in metrics.iter().zip(keys) {
            let seen = match &self.key_cache {
                Some(cache) if cache.touch(mkey, now) => !described.contains(&mkey),
                Some(_) => {
                    described.insert(mkey);
                    false
                }
                None => false,
            };

            if seen {
                let point = MetricPoint {
                    mkey,
                    value: metric.value,
                    // Timestamps are 32 bit on the wire.
                    time: metric.time as u32,
                };
                point.encode(format, batch.push(BufferKind::Compact));
                match format {
                    PointFormat::WithOrg => counts.compact += 1,
                    PointFormat::WithoutOrg => counts.compact_without_org += 1,
                }
            } else {
                metric.encode_full(batch.push(BufferKind::Full))?;
                counts.full += 1;
            }
        }

        Ok(counts)
    }

    /// Receives exactly `expected` delivery reports, recording every failure.
    fn drain(&self, reports: &Receiver<DeliveryReport>, expected: usize, errors: &mut Errors) {
        for received in 0..expected {
            let report = match self.config.ack_timeout {
                Some(timeout) => reports.recv_timeout(timeout),
                None => reports.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            let missing = expected - received;
            match report {
                Ok(DeliveryReport::Delivered { .. }) => {}
                Ok(DeliveryReport::Failed { partition, error }) => {
                    errors.record(PublishError::Delivery { partition, error });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tsgw_log::error!(missing, "delivery reports ended unexpectedly");
                    errors.record(PublishError::MissingReports { missing });
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    errors.record(PublishError::AckTimeout {
                        // Only reachable with a configured timeout.
                        timeout: self.config.ack_timeout.unwrap_or_default(),
                        missing,
                    });
                    return;
                }
            }
        }
    }
}

impl<B: Broker> Publish for Publisher<B> {
    fn publish(&self, metrics: &mut [MetricData]) -> Result<(), PublishError> {
        self.publish_at(metrics, UnixTimestamp::now())
    }

    fn kind(&self) -> &'static str {
        "kafka"
    }
}

impl<B> fmt::Debug for Publisher<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.config.topic)
            .field("partitioner", &self.partitioner)
            .field("compact", &self.key_cache.is_some())
            .finish()
    }
}
