use tsgw_statsd::CounterMetric;

/// Counters of the Kafka producer.
pub enum KafkaCounters {
    /// A record could not be handed to the producer, for example because its queue is full.
    ProducerEnqueueError,
    /// The broker acknowledged a record.
    ProduceStatusSuccess,
    /// The broker reported a failed delivery.
    ProduceStatusError,
}

impl CounterMetric for KafkaCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::ProducerEnqueueError => "kafka.enqueue_error",
            Self::ProduceStatusSuccess => "kafka.delivered",
            Self::ProduceStatusError => "kafka.delivery_error",
        }
    }
}
