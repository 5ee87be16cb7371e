use tsgw_statsd::{CounterMetric, HistogramMetric, TimerMetric};

/// Counter metrics for the publish pipeline.
pub enum PublishCounters {
    /// Number of samples handed to the publish entry point, including dropped ones.
    SamplesIngested,
    /// Number of messages published with the full encoding.
    PublishedFull,
    /// Number of messages published as compact points with the organization id.
    PublishedCompact,
    /// Number of messages published as compact points without the organization id.
    PublishedCompactWithoutOrg,
    /// Number of messages that failed to publish.
    ///
    /// This metric is tagged with:
    ///  - `category`: `producer` if the message could not be submitted, `broker` if the broker
    ///    reported a delivery error, `unexpected` for a missing or late delivery report.
    SendError,
}

impl CounterMetric for PublishCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::SamplesIngested => "publish.samples_ingested",
            Self::PublishedFull => "publish.published.metricdata",
            Self::PublishedCompact => "publish.published.metricpoint",
            Self::PublishedCompactWithoutOrg => "publish.published.metricpoint_no_org",
            Self::SendError => "publish.send_error",
        }
    }
}

/// Histogram metrics for the publish pipeline.
pub enum PublishHistograms {
    /// Size of a single encoded message in bytes.
    MessageSize,
}

impl HistogramMetric for PublishHistograms {
    fn name(&self) -> &'static str {
        match self {
            Self::MessageSize => "publish.message_size",
        }
    }
}

/// Timer metrics for the publish pipeline.
pub enum PublishTimers {
    /// Time from the start of a batch until all its delivery reports arrived.
    ///
    /// Only successful batches are timed.
    Publish,
}

impl TimerMetric for PublishTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::Publish => "publish.duration",
        }
    }
}
