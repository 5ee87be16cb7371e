use std::time::Duration;

use tsgw_common::UnixTimestamp;

/// Width of a time bucket in seconds.
pub const BUCKET_SECONDS: u64 = 600;

/// Largest stale threshold or prune interval accepted by the cache.
///
/// An [`Age`] spans `255 * 10min`, about 42.5 hours. A shard that has to rebase on touch keeps
/// the last `stale` buckets, so the stale threshold must leave some headroom below that.
pub const MAX_THRESHOLD: Duration = Duration::from_secs(40 * 60 * 60);

/// A point in time quantized to ten minute buckets since the epoch.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Ref(u32);

impl Ref {
    /// Creates a reference from a number of buckets since the epoch.
    pub const fn from_buckets(buckets: u32) -> Self {
        Self(buckets)
    }

    /// Returns the bucket containing `timestamp`.
    pub fn quantize(timestamp: UnixTimestamp) -> Self {
        let buckets = timestamp.as_secs() / BUCKET_SECONDS;
        Self(u32::try_from(buckets).unwrap_or(u32::MAX))
    }

    /// Returns the number of buckets since the epoch.
    pub const fn buckets(self) -> u32 {
        self.0
    }

    /// Moves the reference back by `age`, stopping at the epoch.
    pub fn saturating_sub(self, age: Age) -> Self {
        Self(self.0.saturating_sub(age.0.into()))
    }

    /// Returns the reference `age` buckets after this one.
    pub fn saturating_add(self, age: Age) -> Self {
        Self(self.0.saturating_add(age.0.into()))
    }
}

/// The number of ten minute buckets between a shard's [`Ref`] and the last sighting of a key.
///
/// Fits into one byte, which bounds the memory used per tracked series.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Age(u8);

impl Age {
    /// An age of zero buckets.
    pub const ZERO: Self = Self(0);

    /// The largest representable age, about 42.5 hours.
    pub const MAX: Self = Self(u8::MAX);

    /// Creates an age from a number of buckets.
    pub const fn from_buckets(buckets: u8) -> Self {
        Self(buckets)
    }

    /// Converts a duration into whole buckets, rounding down.
    ///
    /// Returns `None` if the duration exceeds [`Age::MAX`].
    pub fn from_duration(duration: Duration) -> Option<Self> {
        let buckets = duration.as_secs() / BUCKET_SECONDS;
        u8::try_from(buckets).ok().map(Self)
    }

    /// Returns the age of `time` relative to `reference`.
    ///
    /// Times before the reference clamp to [`Age::ZERO`], times beyond the horizon clamp to
    /// [`Age::MAX`].
    pub fn between(reference: Ref, time: Ref) -> Self {
        let buckets = time.0.saturating_sub(reference.0);
        Self(u8::try_from(buckets).unwrap_or(u8::MAX))
    }

    /// Subtracts `buckets`, returning `None` if the result would be negative.
    pub fn checked_sub(self, buckets: u32) -> Option<Self> {
        let buckets = u8::try_from(buckets).ok()?;
        self.0.checked_sub(buckets).map(Self)
    }

    /// Returns the number of buckets.
    pub const fn buckets(self) -> u8 {
        self.0
    }

    /// Returns the age as a duration.
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.0) * BUCKET_SECONDS)
    }
}
