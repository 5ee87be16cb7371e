use std::fmt;
use std::str::FromStr;

use crate::{OrganizationId, SchemaError};

/// The content hash identifying a series within an organization.
///
/// This is the md5 digest computed by [`MetricData::set_id`](crate::MetricData::set_id). It is
/// stable across processes and must be computed identically wherever it is produced.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SeriesKey([u8; 16]);

impl SeriesKey {
    /// Length of a series key in bytes.
    pub const LEN: usize = 16;

    /// Creates a series key from its raw digest bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns the leading byte of the key, used to select lock stripes.
    pub const fn leading_byte(&self) -> u8 {
        self.0[0]
    }

    /// Returns the last 15 bytes of the key.
    pub fn tail(&self) -> [u8; 15] {
        let mut tail = [0; 15];
        tail.copy_from_slice(&self.0[1..]);
        tail
    }
}

impl fmt::Debug for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeriesKey({self})")
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A series key qualified by its organization.
///
/// The textual form is the metric id, `<org>.<32 lowercase hex digits>`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MetricKey {
    /// The organization owning the series.
    pub org: OrganizationId,
    /// The content hash of the series.
    pub key: SeriesKey,
}

impl MetricKey {
    /// Creates a new metric key.
    pub const fn new(org: OrganizationId, key: SeriesKey) -> Self {
        Self { org, key }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.org, self.key)
    }
}

impl FromStr for MetricKey {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchemaError::InvalidId(s.to_owned());

        let (org, digest) = s.split_once('.').ok_or_else(invalid)?;
        let org = org.parse().map_err(|_| invalid())?;

        let mut key = [0; SeriesKey::LEN];
        hex::decode_to_slice(digest, &mut key).map_err(|_| invalid())?;

        Ok(Self::new(org, SeriesKey::from_bytes(key)))
    }
}
