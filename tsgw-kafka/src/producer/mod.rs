use std::fmt;
use std::time::Duration;

use crossbeam_channel::Sender;
use rdkafka::ClientConfig;
use rdkafka::producer::{BaseRecord, Producer as _};
use tsgw_statsd::metric;

use crate::statsd::KafkaCounters;
use crate::{Broker, ClientError, DeliveryReport, ProducerConfig, ProducerError, Record};

mod utils;
use utils::{DeliveryContext, ThreadedProducer};

/// A [`Broker`] backed by a librdkafka producer.
pub struct KafkaBroker {
    producer: ThreadedProducer,
    metadata_timeout: Duration,
}

impl KafkaBroker {
    /// Creates the producer from the provided configuration.
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidConfig`] error if the provided configuration is wrong and
    /// the producer could not be created.
    pub fn create(config: &ProducerConfig) -> Result<Self, ClientError> {
        let mut client_config = ClientConfig::new();
        for param in config.client_params() {
            client_config.set(param.name, param.value);
        }

        let producer = client_config
            .create_with_context(DeliveryContext)
            .map_err(|error| ClientError::InvalidConfig(Box::new(error)))?;

        Ok(Self {
            producer,
            metadata_timeout: Duration::from_secs(config.metadata_timeout),
        })
    }
}

impl Broker for KafkaBroker {
    fn produce(
        &self,
        record: Record<'_>,
        reports: &Sender<DeliveryReport>,
    ) -> Result<(), ProducerError> {
        let base_record = BaseRecord::with_opaque_to(record.topic, Box::new(reports.clone()))
            .partition(record.partition)
            .key(record.key)
            .payload(record.payload);

        self.producer.send(base_record).map_err(|(error, _record)| {
            tsgw_log::error!(
                topic = record.topic,
                "failed to enqueue message: {}",
                tsgw_log::LogError(&error)
            );
            metric!(counter(KafkaCounters::ProducerEnqueueError) += 1);
            ProducerError::SendFailed(Box::new(error))
        })
    }

    fn partition_count(&self, topic: &str) -> Result<i32, ClientError> {
        let metadata = self
            .producer
            .client()
            .fetch_metadata(Some(topic), self.metadata_timeout)
            .map_err(|error| ClientError::Metadata {
                topic: topic.to_owned(),
                source: Box::new(error),
            })?;

        let count = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic)
            .map_or(0, |t| t.partitions().len());

        Ok(i32::try_from(count).unwrap_or(i32::MAX))
    }
}

impl fmt::Debug for KafkaBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaBroker")
            .field("producer", &"<ThreadedProducer>")
            .field("metadata_timeout", &self.metadata_timeout)
            .finish()
    }
}
