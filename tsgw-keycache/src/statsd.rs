use tsgw_statsd::{GaugeMetric, TimerMetric};

/// Gauge metrics for the key cache.
pub enum KeyCacheGauges {
    /// Number of series tracked over all organizations, reported after every prune.
    Size,
    /// Number of organizations with at least one tracked series, reported after every prune.
    Orgs,
}

impl GaugeMetric for KeyCacheGauges {
    fn name(&self) -> &'static str {
        match self {
            Self::Size => "keycache.size",
            Self::Orgs => "keycache.orgs",
        }
    }
}

/// Timer metrics for the key cache.
pub enum KeyCacheTimers {
    /// Time spent in one prune cycle over all organizations.
    Prune,
}

impl TimerMetric for KeyCacheTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::Prune => "keycache.prune.duration",
        }
    }
}
