use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The unique identifier of a tenant.
///
/// All series, caches and partitions are scoped by organization.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct OrganizationId(u32);

impl OrganizationId {
    /// Creates a new organization id from its numeric value.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the numeric value of the organization id.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns the little-endian byte representation used on the wire.
    pub const fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl From<u32> for OrganizationId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OrganizationId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let org: OrganizationId = "42".parse().unwrap();
        assert_eq!(org, OrganizationId::new(42));
        assert_eq!(org.to_string(), "42");
        assert!("-1".parse::<OrganizationId>().is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let org = OrganizationId::new(7);
        assert_eq!(serde_json::to_string(&org).unwrap(), "7");
        assert_eq!(serde_json::from_str::<OrganizationId>("7").unwrap(), org);
    }
}
