//! Configuration primitives to configure the kafka producer and properly set up the connection.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kafka configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No bootstrap servers are configured.
    #[error("no kafka brokers configured")]
    NoBrokers,
    /// The topic name is empty.
    #[error("kafka topic must not be empty")]
    EmptyTopic,
    /// The topic reports a partition count below one.
    #[error("invalid partition count {0}, must be at least 1")]
    InvalidPartitionCount(i32),
}

/// A name value pair of librdkafka config parameter.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct KafkaConfigParam {
    /// Name of the Kafka config parameter.
    pub name: String,
    /// Value of the Kafka config parameter.
    pub value: String,
}

impl KafkaConfigParam {
    fn new(name: &str, value: impl ToString) -> Self {
        Self {
            name: name.to_owned(),
            value: value.to_string(),
        }
    }
}

/// Compression codec applied by the producer to message batches.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    /// No compression.
    None,
    /// Gzip.
    Gzip,
    /// Snappy.
    #[default]
    Snappy,
    /// LZ4.
    Lz4,
    /// Zstandard.
    Zstd,
}

impl CompressionCodec {
    /// Returns the librdkafka name of the codec.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Snappy => "snappy",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }
}

impl fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How metrics are assigned to partitions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionScheme {
    /// All series of an organization share a partition.
    ///
    /// Required when points are sent without the organization id, since consumers derive it
    /// from the partition.
    #[serde(alias = "byOrg")]
    ByOrg,
    /// Series are spread by name.
    #[default]
    #[serde(alias = "bySeries")]
    BySeries,
    /// Series are spread by name and tags.
    #[serde(alias = "bySeriesWithTags")]
    BySeriesWithTags,
}

impl fmt::Display for PartitionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ByOrg => "by-org",
            Self::BySeries => "by-series",
            Self::BySeriesWithTags => "by-series-with-tags",
        })
    }
}

/// Configuration of the metrics producer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Bootstrap servers, `host:port`.
    pub brokers: Vec<String>,
    /// Topic metrics are published to.
    pub topic: String,
    /// Compression codec for message batches.
    pub compression: CompressionCodec,
    /// How metrics are assigned to partitions.
    pub partition_scheme: PartitionScheme,
    /// Maximum number of requests in flight per broker connection.
    pub max_in_flight: u32,
    /// Milliseconds to wait for messages to accumulate before sending a batch.
    pub linger_ms: u32,
    /// Maximum number of messages batched in one request.
    pub batch_num_messages: u32,
    /// Maximum number of messages on the producer queue. Produce calls fail beyond this.
    pub queue_max_messages: u32,
    /// Timeout in seconds for fetching topic metadata at startup.
    pub metadata_timeout: u64,
    /// Additional librdkafka parameters, applied after the ones above.
    pub params: Vec<KafkaConfigParam>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_owned()],
            topic: "mdm".to_owned(),
            compression: CompressionCodec::default(),
            partition_scheme: PartitionScheme::default(),
            max_in_flight: 1_000_000,
            linger_ms: 100,
            batch_num_messages: 10_000,
            queue_max_messages: 100_000,
            metadata_timeout: 30,
            params: Vec::new(),
        }
    }
}

impl ProducerConfig {
    /// Checks that the config can be used to create a producer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.brokers.iter().all(|broker| broker.trim().is_empty()) {
            return Err(ConfigError::NoBrokers);
        }
        if self.topic.is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        Ok(())
    }

    /// Returns the librdkafka parameters for this config.
    ///
    /// Every message must be acknowledged by all in-sync replicas and is retried by the client
    /// itself. The publisher does not retry.
    pub fn client_params(&self) -> Vec<KafkaConfigParam> {
        let mut params = vec![
            KafkaConfigParam::new("request.required.acks", "all"),
            KafkaConfigParam::new("message.send.max.retries", 10),
            KafkaConfigParam::new("bootstrap.servers", self.brokers.join(",")),
            KafkaConfigParam::new("compression.codec", self.compression),
            KafkaConfigParam::new("max.in.flight", self.max_in_flight),
            KafkaConfigParam::new("queue.buffering.max.ms", self.linger_ms),
            KafkaConfigParam::new("batch.num.messages", self.batch_num_messages),
            KafkaConfigParam::new("queue.buffering.max.messages", self.queue_max_messages),
        ];
        params.extend(self.params.iter().cloned());
        params
    }
}
