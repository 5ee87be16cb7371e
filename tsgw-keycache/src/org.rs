use tsgw_schema::SeriesKey;

use crate::{Age, Ref, Shard, SubKey};

/// The key cache of a single organization.
///
/// Keys are spread over a fixed number of [`Shard`]s by the leading byte of the series key,
/// which bounds the time any touch waits for a lock.
#[derive(Debug)]
pub struct Cache {
    shards: Box<[Shard]>,
}

impl Cache {
    /// Creates an empty cache with `shard_count` shards anchored at `reference`.
    ///
    /// A `shard_count` of zero is treated as one.
    pub fn new(shard_count: usize, reference: Ref, stale: Age) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Shard::new(reference, stale))
            .collect();

        Self { shards }
    }

    fn shard(&self, key: SeriesKey) -> &Shard {
        &self.shards[usize::from(key.leading_byte()) % self.shards.len()]
    }

    /// Records a sighting of `key` and returns whether it was present before.
    pub fn touch(&self, key: SeriesKey, time: Ref) -> bool {
        self.shard(key).touch(SubKey::from(key), time)
    }

    /// Removes `key` from its shard, returning whether it was present.
    pub fn forget(&self, key: SeriesKey) -> bool {
        self.shard(key).forget(SubKey::from(key))
    }

    /// Returns the number of keys over all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    /// Returns `true` if no shard holds a key.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(Shard::is_empty)
    }

    /// Prunes every shard, see [`Shard::prune`]. Returns the number of remaining keys.
    pub fn prune(&self, now: Ref) -> usize {
        self.shards.iter().map(|shard| shard.prune(now)).sum()
    }

    /// Returns the number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STALE: Age = Age::from_buckets(5);

    fn key(leading: u8, rest: u8) -> SeriesKey {
        let mut bytes = [rest; 16];
        bytes[0] = leading;
        SeriesKey::from_bytes(bytes)
    }

    #[test]
    fn test_routes_by_leading_byte() {
        let cache = Cache::new(256, Ref::from_buckets(0), STALE);
        let now = Ref::from_buckets(1);

        assert!(!cache.touch(key(1, 7), now));
        assert!(!cache.touch(key(2, 7), now));
        assert!(cache.touch(key(1, 7), now));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.shards[1].len(), 1);
        assert_eq!(cache.shards[2].len(), 1);
    }

    #[test]
    fn test_fewer_shards_share_sub_keys() {
        let cache = Cache::new(1, Ref::from_buckets(0), STALE);
        let now = Ref::from_buckets(1);

        assert_eq!(cache.shard_count(), 1);
        assert!(!cache.touch(key(1, 7), now));
        assert!(!cache.touch(key(1, 8), now));
        // Same tail, same single shard.
        assert!(cache.touch(key(2, 7), now));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_prune_all_shards() {
        let cache = Cache::new(16, Ref::from_buckets(100), STALE);
        // Leading bytes 16 apart share a shard, so the tails must differ.
        for leading in 0..32 {
            assert!(!cache.touch(key(leading, leading), Ref::from_buckets(100)));
        }
        assert_eq!(cache.len(), 32);
        assert!(cache.shards.iter().all(|shard| shard.len() == 2));

        assert_eq!(cache.prune(Ref::from_buckets(105)), 32);
        assert_eq!(cache.prune(Ref::from_buckets(106)), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_shards() {
        let cache = Cache::new(0, Ref::from_buckets(0), STALE);
        assert_eq!(cache.shard_count(), 1);
    }
}
