use hashbrown::HashMap;
use parking_lot::Mutex;
use tsgw_schema::SeriesKey;

use crate::{Age, Ref};

/// The last 15 bytes of a [`SeriesKey`].
///
/// The leading byte selects the shard and does not need to be stored. With fewer than 256
/// shards, keys differing only in their leading byte share a slot. The remaining 120 bits of
/// an md5 digest make such collisions negligible.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SubKey([u8; 15]);

impl From<SeriesKey> for SubKey {
    fn from(key: SeriesKey) -> Self {
        Self(key.tail())
    }
}

/// A lock stripe of an organization's [`Cache`](crate::Cache).
///
/// All ages in a shard are relative to one [`Ref`], which never lies after the oldest bucket
/// that is still considered fresh. Pruning moves this reference forward and drops every entry
/// that falls behind it.
///
/// A sighting more than [`Age::MAX`] buckets after the reference does not fit into an age.
/// Such a touch rebases the shard to `time - stale` first, expiring entries that are stale at
/// `time` anyway. Ages are therefore exact regardless of how far apart prunes are.
#[derive(Debug)]
pub struct Shard {
    stale: Age,
    inner: Mutex<ShardInner>,
}

#[derive(Debug)]
struct ShardInner {
    reference: Ref,
    entries: HashMap<SubKey, Age>,
}

impl ShardInner {
    /// Moves the reference forward to `reference` and drops entries last seen before it.
    fn rebase(&mut self, reference: Ref) {
        let rebase = reference.buckets().saturating_sub(self.reference.buckets());
        if rebase == 0 {
            return;
        }

        // An entry was last seen at `old_reference + age`. It is stale iff that lies before the
        // new reference, i.e. `age < rebase`. Every kept entry has `age >= rebase`, so the
        // rebased age cannot underflow.
        self.entries
            .retain(|_, age| match age.checked_sub(rebase) {
                Some(rebased) => {
                    *age = rebased;
                    true
                }
                None => false,
            });

        self.reference = reference;
    }
}

impl Shard {
    /// Creates an empty shard anchored at `reference`, expiring keys older than `stale`.
    pub fn new(reference: Ref, stale: Age) -> Self {
        Self {
            stale,
            inner: Mutex::new(ShardInner {
                reference,
                entries: HashMap::new(),
            }),
        }
    }

    /// Records a sighting of `key` at `time` and returns whether it was present before.
    pub fn touch(&self, key: SubKey, time: Ref) -> bool {
        let mut inner = self.inner.lock();

        let offset = time.buckets().saturating_sub(inner.reference.buckets());
        if offset > u32::from(Age::MAX.buckets()) {
            inner.rebase(time.saturating_sub(self.stale));
        }

        let age = Age::between(inner.reference, time);
        inner.entries.insert(key, age).is_some()
    }

    /// Removes `key`, returning whether it was present.
    pub fn forget(&self, key: SubKey) -> bool {
        self.inner.lock().entries.remove(&key).is_some()
    }

    /// Returns the number of keys in the shard.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if the shard holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expires keys last seen before `now - stale` and rebases the shard to that point.
    ///
    /// A clock going backwards never moves the reference back. Returns the number of remaining
    /// keys.
    pub fn prune(&self, now: Ref) -> usize {
        let mut inner = self.inner.lock();
        let reference = now.saturating_sub(self.stale).max(inner.reference);
        inner.rebase(reference);
        inner.entries.len()
    }

    /// Returns the bucket in which `key` was last seen.
    #[cfg(test)]
    pub(crate) fn last_seen(&self, key: &SubKey) -> Option<Ref> {
        let inner = self.inner.lock();
        let age = inner.entries.get(key)?;
        Some(inner.reference.saturating_add(*age))
    }

    #[cfg(test)]
    pub(crate) fn reference(&self) -> Ref {
        self.inner.lock().reference
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::{Rng, SeedableRng};

    use super::*;

    /// The stale threshold used by most tests, six hours.
    const STALE: Age = Age::from_buckets(36);

    fn sub_key(n: u8) -> SubKey {
        SubKey([n; 15])
    }

    #[test]
    fn test_touch_monotonic() {
        let shard = Shard::new(Ref::from_buckets(1000), STALE);

        assert!(!shard.touch(sub_key(1), Ref::from_buckets(1000)));
        assert!(shard.touch(sub_key(1), Ref::from_buckets(1001)));
        assert!(shard.touch(sub_key(1), Ref::from_buckets(1001)));
        assert!(!shard.touch(sub_key(2), Ref::from_buckets(1001)));
        assert_eq!(shard.len(), 2);
    }

    #[test]
    fn test_prune_expires_and_rebases() {
        let shard = Shard::new(Ref::from_buckets(1000), STALE);

        shard.touch(sub_key(1), Ref::from_buckets(1000));
        shard.touch(sub_key(2), Ref::from_buckets(1030));

        assert_eq!(shard.prune(Ref::from_buckets(1040)), 1);
        assert_eq!(shard.reference(), Ref::from_buckets(1004));
        assert_eq!(shard.last_seen(&sub_key(1)), None);
        assert_eq!(
            shard.last_seen(&sub_key(2)),
            Some(Ref::from_buckets(1030))
        );
    }

    #[test]
    fn test_prune_keeps_boundary() {
        let shard = Shard::new(Ref::from_buckets(1000), STALE);

        shard.touch(sub_key(1), Ref::from_buckets(1010));
        assert_eq!(shard.prune(Ref::from_buckets(1046)), 1);
        assert_eq!(shard.prune(Ref::from_buckets(1047)), 0);
        assert!(!shard.touch(sub_key(1), Ref::from_buckets(1047)));
    }

    #[test]
    fn test_prune_clock_going_backwards() {
        let shard = Shard::new(Ref::from_buckets(1000), Age::from_buckets(6));

        shard.touch(sub_key(1), Ref::from_buckets(1003));
        assert_eq!(shard.prune(Ref::from_buckets(900)), 1);
        assert_eq!(shard.reference(), Ref::from_buckets(1000));
        assert_eq!(shard.last_seen(&sub_key(1)), Some(Ref::from_buckets(1003)));
    }

    #[test]
    fn test_touch_before_reference_clamps() {
        let shard = Shard::new(Ref::from_buckets(1000), STALE);
        shard.touch(sub_key(1), Ref::from_buckets(990));
        assert_eq!(shard.last_seen(&sub_key(1)), Some(Ref::from_buckets(1000)));
    }

    #[test]
    fn test_touch_beyond_horizon_rebases() {
        // 40 hours, the largest accepted threshold.
        let stale = Age::from_buckets(240);
        let shard = Shard::new(Ref::from_buckets(1000), stale);

        shard.touch(sub_key(1), Ref::from_buckets(1000));
        shard.touch(sub_key(2), Ref::from_buckets(1100));

        // 300 buckets after the reference does not fit into an age.
        assert!(!shard.touch(sub_key(3), Ref::from_buckets(1300)));
        assert_eq!(shard.reference(), Ref::from_buckets(1060));

        // Key 1 is 50 hours old and expired, key 2 is kept with its exact bucket.
        assert_eq!(shard.last_seen(&sub_key(1)), None);
        assert_eq!(shard.last_seen(&sub_key(2)), Some(Ref::from_buckets(1100)));
        assert_eq!(shard.last_seen(&sub_key(3)), Some(Ref::from_buckets(1300)));
        assert!(shard.touch(sub_key(2), Ref::from_buckets(1300)));
    }

    /// Random interleavings of touches and prunes, checked against a model that remembers
    /// the exact bucket of the last sighting for every key.
    #[test]
    fn test_random_touch_prune_interleavings() {
        let mut rng = rand_pcg::Pcg32::seed_from_u64(0x5eed);

        for _ in 0..100 {
            // Any stale threshold and prune interval up to 40 hours, and sometimes gaps that
            // exceed the horizon of an age.
            let stale = Age::from_buckets(rng.random_range(0..=240));
            let max_gap = if rng.random_bool(0.2) { 600 } else { 240 };

            let mut now = Ref::from_buckets(rng.random_range(1_000..3_000_000));
            let shard = Shard::new(now, stale);
            let mut reference = now;
            let mut model = BTreeMap::new();

            for _ in 0..200 {
                let next_prune = now.buckets() + rng.random_range(0..=max_gap);

                for _ in 0..rng.random_range(0..20) {
                    now = Ref::from_buckets(rng.random_range(now.buckets()..=next_prune));

                    if now.buckets() - reference.buckets() > u32::from(Age::MAX.buckets()) {
                        reference = now.saturating_sub(stale);
                        model.retain(|_, seen| *seen >= reference);
                    }

                    let key = sub_key(rng.random_range(0..32));
                    let expected = model.insert(key, now).is_some();
                    assert_eq!(shard.touch(key, now), expected);
                }

                now = Ref::from_buckets(next_prune);
                reference = now.saturating_sub(stale).max(reference);
                model.retain(|_, seen| *seen >= reference);

                assert_eq!(shard.prune(now), model.len());
                assert_eq!(shard.reference(), reference);
                for (key, seen) in &model {
                    assert_eq!(shard.last_seen(key), Some(*seen));
                }
            }
        }
    }
}
