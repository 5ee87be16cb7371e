use std::error::Error;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use thiserror::Error;

/// A boxed error returned by the underlying client.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Kafka producer errors.
///
/// Returned when a message could not be handed to the client. Errors reported by the broker
/// after the message was accepted arrive as [`DeliveryReport::Failed`].
#[derive(Debug, Error)]
pub enum ProducerError {
    /// Failed to enqueue a kafka message, for example because the producer queue is full.
    #[error("failed to send kafka message")]
    SendFailed(#[source] BoxError),
}

/// Kafka client errors, fatal at startup.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to create a kafka producer because of the invalid configuration.
    #[error("failed to create kafka producer: invalid kafka config")]
    InvalidConfig(#[source] BoxError),

    /// Failed to fetch metadata of the topic.
    #[error("failed to fetch metadata for topic {topic:?}")]
    Metadata {
        /// The topic that was queried.
        topic: String,
        /// The client error.
        #[source]
        source: BoxError,
    },

    /// The topic did not report any partitions.
    #[error("topic {topic:?} has no partitions after {attempts} attempts")]
    NoPartitions {
        /// The topic that was queried.
        topic: String,
        /// How often the metadata was fetched.
        attempts: u32,
    },
}

/// A single message to be produced.
#[derive(Clone, Copy, Debug)]
pub struct Record<'a> {
    /// The destination topic.
    pub topic: &'a str,
    /// The destination partition.
    pub partition: i32,
    /// The partition key, stored alongside the message.
    pub key: &'a [u8],
    /// The message payload.
    pub payload: &'a [u8],
}

/// The outcome of a produced message, sent once per accepted message.
#[derive(Clone, Debug, PartialEq)]
pub enum DeliveryReport {
    /// The broker acknowledged the message.
    Delivered {
        /// Partition the message was written to.
        partition: i32,
        /// Offset of the message in the partition.
        offset: i64,
    },
    /// The message could not be delivered after all retries of the client.
    Failed {
        /// Partition the message was produced to.
        partition: i32,
        /// Description of the delivery error.
        error: String,
    },
}

/// A message broker the publisher produces to.
///
/// Producing is asynchronous: [`produce`](Self::produce) only enqueues the message. For every
/// message it accepts, the broker sends exactly one [`DeliveryReport`] on `reports` once the
/// outcome is known.
pub trait Broker: Send + Sync {
    /// Enqueues a message.
    ///
    /// When this returns an error, no report is sent for the message.
    fn produce(
        &self,
        record: Record<'_>,
        reports: &Sender<DeliveryReport>,
    ) -> Result<(), ProducerError>;

    /// Returns the number of partitions of `topic`.
    ///
    /// Returns `Ok(0)` if the topic exists but its partitions are not known yet.
    fn partition_count(&self, topic: &str) -> Result<i32, ClientError>;
}

impl<B: Broker + ?Sized> Broker for std::sync::Arc<B> {
    fn produce(
        &self,
        record: Record<'_>,
        reports: &Sender<DeliveryReport>,
    ) -> Result<(), ProducerError> {
        (**self).produce(record, reports)
    }

    fn partition_count(&self, topic: &str) -> Result<i32, ClientError> {
        (**self).partition_count(topic)
    }
}

/// Fetches the partition count of `topic`, waiting for a freshly created topic to report its
/// partitions.
///
/// Makes up to `attempts` attempts, `delay` apart. Errors from the broker are returned
/// immediately.
pub fn fetch_partition_count(
    broker: &dyn Broker,
    topic: &str,
    attempts: u32,
    delay: Duration,
) -> Result<i32, ClientError> {
    for attempt in 1..=attempts {
        let count = broker.partition_count(topic)?;
        if count > 0 {
            return Ok(count);
        }

        tsgw_log::debug!(topic, attempt, "topic has no partitions yet");
        if attempt < attempts {
            thread::sleep(delay);
        }
    }

    Err(ClientError::NoPartitions {
        topic: topic.to_owned(),
        attempts,
    })
}
