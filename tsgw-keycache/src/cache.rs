use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tsgw_common::UnixTimestamp;
use tsgw_schema::{MetricKey, OrganizationId};

use crate::{Age, Cache, KeyCacheConfig, KeyCacheError, Ref};

/// Outcome of a [`KeyCache::prune`] cycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PruneReport {
    /// Number of series still tracked.
    pub keys: usize,
    /// Number of organizations still tracked.
    pub orgs: usize,
    /// Number of organizations dropped because their cache became empty.
    pub removed_orgs: usize,
}

/// Remembers which series have been seen recently, per organization.
///
/// See the [crate documentation](crate) for the memory layout.
#[derive(Debug)]
pub struct KeyCache {
    stale: Age,
    prune_interval: Duration,
    shard_count: usize,
    caches: RwLock<HashMap<OrganizationId, Arc<Cache>>>,
}

impl KeyCache {
    /// Creates an empty key cache.
    ///
    /// Fails if the stale threshold or prune interval exceed [`MAX_THRESHOLD`](crate::MAX_THRESHOLD)
    /// or the shard count is out of range.
    pub fn new(config: &KeyCacheConfig) -> Result<Self, KeyCacheError> {
        config.validate()?;

        Ok(Self {
            stale: config.stale_age()?,
            prune_interval: config.prune_interval,
            shard_count: config.shard_count,
            caches: RwLock::new(HashMap::new()),
        })
    }

    /// Marks `key` as seen at `now` and returns whether it had been seen before.
    pub fn touch(&self, key: MetricKey, now: UnixTimestamp) -> bool {
        let now = Ref::quantize(now);

        let cache = self.caches.read().get(&key.org).cloned();
        let cache = match cache {
            Some(cache) => cache,
            None => {
                // Another thread may have added the organization in the meantime.
                let mut caches = self.caches.write();
                let (shard_count, stale) = (self.shard_count, self.stale);
                Arc::clone(
                    caches
                        .entry(key.org)
                        .or_insert_with(|| Arc::new(Cache::new(shard_count, now, stale))),
                )
            }
        };

        cache.touch(key.key, now)
    }

    /// Removes `key` so that its next touch reports it as unseen.
    ///
    /// Returns whether the key was present. Empty organizations are left to the next prune.
    pub fn forget(&self, key: MetricKey) -> bool {
        let cache = self.caches.read().get(&key.org).cloned();
        cache.is_some_and(|cache| cache.forget(key.key))
    }

    /// Returns the number of tracked series over all organizations.
    pub fn len(&self) -> usize {
        self.snapshot().iter().map(|(_, cache)| cache.len()).sum()
    }

    /// Returns `true` if no series is tracked.
    pub fn is_empty(&self) -> bool {
        self.snapshot().iter().all(|(_, cache)| cache.is_empty())
    }

    /// Returns the number of organizations with a cache.
    pub fn org_count(&self) -> usize {
        self.caches.read().len()
    }

    /// The configured interval between two prune cycles.
    pub fn prune_interval(&self) -> Duration {
        self.prune_interval
    }

    /// The configured stale threshold, rounded down to whole buckets.
    pub fn stale_threshold(&self) -> Duration {
        self.stale.as_duration()
    }

    /// Expires series not seen within the stale threshold before `now`.
    ///
    /// Organizations left without any series are removed.
    pub fn prune(&self, now: UnixTimestamp) -> PruneReport {
        let now = Ref::quantize(now);
        let mut report = PruneReport::default();

        for (org, cache) in self.snapshot() {
            let remaining = cache.prune(now);
            report.keys += remaining;

            if remaining == 0 {
                let mut caches = self.caches.write();
                // A touch may have raced with the prune, check again under the write lock.
                if cache.is_empty() && caches.remove(&org).is_some() {
                    report.removed_orgs += 1;
                }
            }
        }

        report.orgs = self.org_count();
        report
    }

    /// Copies the organization list, so that no lock is held while iterating shards.
    fn snapshot(&self) -> Vec<(OrganizationId, Arc<Cache>)> {
        self.caches
            .read()
            .iter()
            .map(|(org, cache)| (*org, Arc::clone(cache)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tsgw_schema::SeriesKey;

    use super::*;

    const HOUR: u64 = 60 * 60;
    const T0: u64 = 1_700_000_400;

    fn at(secs: u64) -> UnixTimestamp {
        UnixTimestamp::from_secs(secs)
    }

    fn mkey(org: u32, n: u8) -> MetricKey {
        let mut key = [n; 16];
        key[15] = n.wrapping_mul(31);
        MetricKey::new(OrganizationId::new(org), SeriesKey::from_bytes(key))
    }

    fn cache() -> KeyCache {
        KeyCache::new(&KeyCacheConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = KeyCacheConfig {
            stale_threshold: Duration::from_secs(41 * HOUR),
            ..Default::default()
        };
        assert!(matches!(
            KeyCache::new(&config),
            Err(KeyCacheError::StaleThresholdTooLong(_))
        ));
    }

    #[test]
    fn test_touch_monotonicity() {
        let cache = cache();

        assert!(!cache.touch(mkey(1, 1), at(T0)));
        assert!(cache.touch(mkey(1, 1), at(T0 + 60)));
        assert!(cache.touch(mkey(1, 1), at(T0 + HOUR)));
        assert_eq!(cache.len(), 1);

        cache.prune(at(T0 + 8 * HOUR));
        assert!(!cache.touch(mkey(1, 1), at(T0 + 8 * HOUR)));
    }

    #[test]
    fn test_orgs_are_isolated() {
        let cache = cache();

        assert!(!cache.touch(mkey(1, 1), at(T0)));
        assert!(!cache.touch(mkey(2, 1), at(T0)));
        assert!(cache.touch(mkey(2, 1), at(T0)));
        assert_eq!(cache.org_count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_forget() {
        let cache = cache();

        assert!(!cache.forget(mkey(1, 1)));
        assert!(!cache.touch(mkey(1, 1), at(T0)));
        assert!(!cache.touch(mkey(1, 2), at(T0)));

        assert!(cache.forget(mkey(1, 1)));
        assert!(!cache.forget(mkey(1, 1)));
        assert!(!cache.forget(mkey(2, 1)));
        assert_eq!(cache.len(), 1);

        assert!(!cache.touch(mkey(1, 1), at(T0 + 60)));
        assert!(cache.touch(mkey(1, 2), at(T0 + 60)));
    }

    #[test]
    fn test_stale_after_threshold() {
        let cache = cache();
        let key = mkey(7, 3);

        assert!(!cache.touch(key, at(T0)));
        assert!(cache.touch(key, at(T0 + 60)));

        // Hourly prunes keep the key for six hours.
        for hour in 1..=6 {
            let report = cache.prune(at(T0 + hour * HOUR));
            assert_eq!(report.keys, 1, "pruned after {hour} hours");
        }

        let report = cache.prune(at(T0 + 7 * HOUR));
        assert_eq!(
            report,
            PruneReport {
                keys: 0,
                orgs: 0,
                removed_orgs: 1,
            }
        );
        assert!(cache.is_empty());
        assert!(!cache.touch(key, at(T0 + 7 * HOUR)));
    }

    #[test]
    fn test_prune_keeps_active_orgs() {
        let cache = cache();

        cache.touch(mkey(1, 1), at(T0));
        cache.touch(mkey(2, 1), at(T0));
        cache.touch(mkey(2, 2), at(T0 + 5 * HOUR));

        let report = cache.prune(at(T0 + 7 * HOUR));
        assert_eq!(report.keys, 1);
        assert_eq!(report.orgs, 1);
        assert_eq!(report.removed_orgs, 1);
        assert!(cache.touch(mkey(2, 2), at(T0 + 7 * HOUR)));
        assert!(!cache.touch(mkey(2, 1), at(T0 + 7 * HOUR)));
    }

    #[test]
    fn test_single_shard() {
        let config = KeyCacheConfig {
            shard_count: 1,
            ..Default::default()
        };
        let cache = KeyCache::new(&config).unwrap();

        for n in 0..50 {
            assert!(!cache.touch(mkey(1, n), at(T0)));
        }
        for n in 0..50 {
            assert!(cache.touch(mkey(1, n), at(T0 + 60)));
        }
        assert_eq!(cache.len(), 50);
    }

    fn limits_cache(prune_interval: Duration) -> KeyCache {
        let config = KeyCacheConfig {
            stale_threshold: Duration::from_secs(40 * HOUR),
            prune_interval,
            ..Default::default()
        };
        KeyCache::new(&config).unwrap()
    }

    #[test]
    fn test_fresh_key_kept_at_limits() {
        let cache = limits_cache(Duration::from_secs(33 * HOUR + 20 * 60));
        let key = mkey(1, 1);

        // The organization appears at T0, the key only shortly before the next prune.
        assert!(!cache.touch(mkey(1, 2), at(T0)));
        cache.prune(at(T0));
        assert!(!cache.touch(key, at(T0 + 33 * HOUR + 10 * 60)));
        cache.prune(at(T0 + 33 * HOUR + 20 * 60));
        cache.prune(at(T0 + 66 * HOUR + 40 * 60));

        // Seen 33.5 hours ago with a 40 hour threshold.
        assert!(cache.touch(key, at(T0 + 66 * HOUR + 40 * 60)));
        // Seen 66.7 hours ago, long expired.
        assert!(!cache.touch(mkey(1, 2), at(T0 + 66 * HOUR + 40 * 60)));
    }

    #[test]
    fn test_stale_window_exact_at_limits() {
        let cache = limits_cache(Duration::from_secs(40 * HOUR));
        let late = mkey(3, 1);
        let early = mkey(3, 2);

        cache.touch(early, at(T0));
        assert_eq!(cache.prune(at(T0 + 40 * HOUR)).keys, 1);

        // 79 hours after the shard reference, beyond the horizon of a single age.
        assert!(!cache.touch(late, at(T0 + 79 * HOUR)));
        assert_eq!(cache.prune(at(T0 + 80 * HOUR)).keys, 1);
        assert!(cache.touch(late, at(T0 + 80 * HOUR)));
        assert!(!cache.touch(early, at(T0 + 80 * HOUR)));

        // Both expire exactly 40 hours after their last touch.
        assert_eq!(cache.prune(at(T0 + 120 * HOUR)).keys, 2);
        assert_eq!(cache.prune(at(T0 + 120 * HOUR + 10 * 60)).keys, 0);
    }

    #[test]
    fn test_concurrent_touches() {
        let cache = Arc::new(cache());

        let handles: Vec<_> = (0..8u32)
            .map(|org| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let mut seen = 0;
                    for n in 0..=255u8 {
                        // Every thread touches its own org and a shared one.
                        cache.touch(mkey(org + 100, n), at(T0));
                        if cache.touch(mkey(1, n), at(T0)) {
                            seen += 1;
                        }
                    }
                    seen
                })
            })
            .collect();

        let seen: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // Only the first sighting of each shared key reports it as new.
        assert_eq!(seen, 8 * 256 - 256);
        assert_eq!(cache.org_count(), 9);
        assert_eq!(cache.len(), 9 * 256);
    }
}
