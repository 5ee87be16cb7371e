use std::time::Duration;

use crate::{Age, KeyCacheError, MAX_THRESHOLD};

/// Maximum number of shards per organization, one per value of the leading key byte.
pub const MAX_SHARD_COUNT: usize = 256;

/// Configuration for the [`KeyCache`](crate::KeyCache).
#[derive(Clone, Debug, PartialEq)]
pub struct KeyCacheConfig {
    /// Series not seen for this long are forgotten, and described in full again when they
    /// reappear.
    pub stale_threshold: Duration,

    /// How often stale series are expired.
    pub prune_interval: Duration,

    /// Number of lock stripes per organization.
    ///
    /// Keys are assigned to shards by their leading byte modulo this count, so values above
    /// 256 have no effect and are rejected.
    pub shard_count: usize,
}

impl KeyCacheConfig {
    /// Checks the configuration against the limits of the internal bookkeeping.
    pub fn validate(&self) -> Result<(), KeyCacheError> {
        if self.stale_threshold > MAX_THRESHOLD {
            return Err(KeyCacheError::StaleThresholdTooLong(self.stale_threshold));
        }
        if self.prune_interval > MAX_THRESHOLD {
            return Err(KeyCacheError::PruneIntervalTooLong(self.prune_interval));
        }
        if self.prune_interval.is_zero() {
            return Err(KeyCacheError::ZeroPruneInterval);
        }
        if !(1..=MAX_SHARD_COUNT).contains(&self.shard_count) {
            return Err(KeyCacheError::InvalidShardCount(self.shard_count));
        }
        Ok(())
    }

    /// The stale threshold in buckets.
    pub(crate) fn stale_age(&self) -> Result<Age, KeyCacheError> {
        Age::from_duration(self.stale_threshold)
            .ok_or(KeyCacheError::StaleThresholdTooLong(self.stale_threshold))
    }
}

impl Default for KeyCacheConfig {
    fn default() -> Self {
        Self {
            stale_threshold: Duration::from_secs(6 * 60 * 60),
            prune_interval: Duration::from_secs(60 * 60),
            shard_count: MAX_SHARD_COUNT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(KeyCacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_limits() {
        let hours = |h: u64| Duration::from_secs(h * 60 * 60);

        let config = KeyCacheConfig {
            stale_threshold: hours(40),
            prune_interval: hours(40),
            shard_count: 1,
        };
        assert!(config.validate().is_ok());

        let config = KeyCacheConfig {
            stale_threshold: hours(41),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(KeyCacheError::StaleThresholdTooLong(_))
        ));

        let config = KeyCacheConfig {
            prune_interval: hours(41),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(KeyCacheError::PruneIntervalTooLong(_))
        ));

        let config = KeyCacheConfig {
            prune_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(KeyCacheError::ZeroPruneInterval)
        ));

        for shard_count in [0, 257] {
            let config = KeyCacheConfig {
                shard_count,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(KeyCacheError::InvalidShardCount(_))
            ));
        }
    }
}
