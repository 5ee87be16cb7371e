use tsgw_schema::MetricData;

use crate::{Publish, PublishError};

/// Drops all metrics. Used when publishing is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullPublisher;

impl Publish for NullPublisher {
    fn publish(&self, metrics: &mut [MetricData]) -> Result<(), PublishError> {
        tsgw_log::debug!(
            count = metrics.len(),
            "publishing not enabled, dropping metrics"
        );
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "null"
    }
}
