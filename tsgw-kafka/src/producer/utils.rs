use crossbeam_channel::Sender;
use rdkafka::ClientContext;
use rdkafka::message::Message as _;
use rdkafka::producer::{DeliveryResult, ProducerContext};
use tsgw_log::LogError;
use tsgw_statsd::metric;

use crate::DeliveryReport;
use crate::statsd::KafkaCounters;

/// Kafka producer context that forwards delivery results to the publisher.
#[derive(Debug)]
pub struct DeliveryContext;

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    /// Every message carries the report channel of the batch it belongs to.
    type DeliveryOpaque = Box<Sender<DeliveryReport>>;

    /// This method is called after attempting to send a message to Kafka.
    /// It's called asynchronously for every message, so we want to handle errors explicitly here.
    fn delivery(&self, result: &DeliveryResult<'_>, reports: Self::DeliveryOpaque) {
        let report = match result {
            Ok(message) => {
                metric!(counter(KafkaCounters::ProduceStatusSuccess) += 1);
                DeliveryReport::Delivered {
                    partition: message.partition(),
                    offset: message.offset(),
                }
            }
            Err((error, message)) => {
                tsgw_log::error!(
                    partition = message.partition(),
                    "failed to produce message to Kafka (delivery callback): {}",
                    LogError(error)
                );
                metric!(counter(KafkaCounters::ProduceStatusError) += 1);
                DeliveryReport::Failed {
                    partition: message.partition(),
                    error: error.to_string(),
                }
            }
        };

        // The publisher stops listening once it gave up on the batch.
        if reports.send(report).is_err() {
            tsgw_log::debug!("dropped delivery report of an abandoned batch");
        }
    }
}

/// The wrapper type around the kafka [`rdkafka::producer::ThreadedProducer`] with our own
/// [`DeliveryContext`] context.
pub type ThreadedProducer = rdkafka::producer::ThreadedProducer<DeliveryContext>;
