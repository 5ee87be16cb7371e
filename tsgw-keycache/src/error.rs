use std::time::Duration;

use thiserror::Error;

/// An error returned when the key cache is configured incorrectly.
#[derive(Debug, Error)]
pub enum KeyCacheError {
    /// The stale threshold exceeds the horizon of the internal bookkeeping.
    #[error("stale threshold of {0:?} exceeds the maximum of 40 hours")]
    StaleThresholdTooLong(Duration),

    /// The prune interval exceeds the horizon of the internal bookkeeping.
    #[error("prune interval of {0:?} exceeds the maximum of 40 hours")]
    PruneIntervalTooLong(Duration),

    /// The prune interval is zero.
    #[error("prune interval must not be zero")]
    ZeroPruneInterval,

    /// The number of shards per organization is out of range.
    #[error("shard count must be between 1 and 256, got {0}")]
    InvalidShardCount(usize),
}
