use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tsgw_kafka::ProducerError;
use tsgw_schema::SchemaError;

/// The reason a message could not be published.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SendErrorCategory {
    /// The broker client refused to accept the message.
    Producer,
    /// The broker reported a delivery failure.
    Broker,
    /// A delivery report was missing, late, or malformed.
    Unexpected,
}

impl SendErrorCategory {
    /// Returns the name used in logs and metric tags.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Broker => "broker",
            Self::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for SendErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned from publishing a batch.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A metric of the batch could not be encoded. Nothing was produced.
    #[error("invalid metric in batch")]
    InvalidMetric(#[from] SchemaError),

    /// A message could not be submitted to the broker client.
    #[error("failed to submit message")]
    Producer(#[from] ProducerError),

    /// The broker reported that a message was not delivered.
    #[error("failed to deliver message to partition {partition}: {error}")]
    Delivery {
        /// The partition of the message.
        partition: i32,
        /// The error reported by the broker.
        error: String,
    },

    /// The delivery reports stopped before every message was accounted for.
    #[error("delivery reports ended with {missing} messages unaccounted for")]
    MissingReports {
        /// The number of messages without a report.
        missing: usize,
    },

    /// No delivery report arrived within the acknowledgement timeout.
    #[error("no delivery report within {timeout:?}, {missing} messages unaccounted for")]
    AckTimeout {
        /// The configured timeout.
        timeout: Duration,
        /// The number of messages without a report.
        missing: usize,
    },
}

impl PublishError {
    /// Returns the send error category, or `None` if the batch failed before anything was sent.
    pub fn category(&self) -> Option<SendErrorCategory> {
        match self {
            Self::InvalidMetric(_) => None,
            Self::Producer(_) => Some(SendErrorCategory::Producer),
            Self::Delivery { .. } => Some(SendErrorCategory::Broker),
            Self::MissingReports { .. } | Self::AckTimeout { .. } => {
                Some(SendErrorCategory::Unexpected)
            }
        }
    }
}
