use crate::{MetricKey, OrganizationId, SchemaError, SeriesKey};

/// The leading byte identifying a compact point message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PointFormat {
    /// Point including the organization id, 33 bytes.
    WithOrg = 2,
    /// Point without the organization id, 29 bytes.
    ///
    /// Consumers derive the organization from the partition, which requires partitioning by
    /// organization.
    WithoutOrg = 3,
}

impl PointFormat {
    /// Returns the encoded size of a point in this format.
    pub const fn size(self) -> usize {
        match self {
            Self::WithOrg => 33,
            Self::WithoutOrg => 29,
        }
    }

    /// Detects the format from the first byte of a message.
    ///
    /// Returns `None` for anything else, in particular for full metric messages.
    pub fn detect(message: &[u8]) -> Option<Self> {
        match message.first()? {
            2 => Some(Self::WithOrg),
            3 => Some(Self::WithoutOrg),
            _ => None,
        }
    }
}

/// A sample of an already described series.
///
/// The point carries no name, tags or unit. Consumers must have seen the full [`MetricData`]
/// for the series before.
///
/// [`MetricData`]: crate::MetricData
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricPoint {
    /// The series this point belongs to.
    pub mkey: MetricKey,
    /// The sample value.
    pub value: f64,
    /// Unix timestamp of the sample in seconds.
    pub time: u32,
}

impl MetricPoint {
    /// Appends the compact encoding of this point to `buf`.
    pub fn encode(&self, format: PointFormat, buf: &mut Vec<u8>) {
        buf.reserve(format.size());
        buf.push(format as u8);
        buf.extend_from_slice(self.mkey.key.as_bytes());
        if format == PointFormat::WithOrg {
            buf.extend_from_slice(&self.mkey.org.to_le_bytes());
        }
        buf.extend_from_slice(&self.value.to_le_bytes());
        buf.extend_from_slice(&self.time.to_le_bytes());
    }

    /// Decodes a compact point.
    ///
    /// Points in [`PointFormat::WithoutOrg`] decode with organization `0`, the consumer has
    /// to fill it in.
    pub fn decode(message: &[u8]) -> Result<(PointFormat, Self), SchemaError> {
        let format =
            PointFormat::detect(message).ok_or(SchemaError::InvalidPoint("unknown format"))?;
        if message.len() != format.size() {
            return Err(SchemaError::InvalidPoint("unexpected length"));
        }

        let mut reader = Reader(&message[1..]);
        let key = SeriesKey::from_bytes(reader.take()?);
        let org = match format {
            PointFormat::WithOrg => u32::from_le_bytes(reader.take()?),
            PointFormat::WithoutOrg => 0,
        };
        let value = f64::from_le_bytes(reader.take()?);
        let time = u32::from_le_bytes(reader.take()?);

        let point = Self {
            mkey: MetricKey::new(OrganizationId::new(org), key),
            value,
            time,
        };

        Ok((format, point))
    }
}

struct Reader<'a>(&'a [u8]);

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], SchemaError> {
        let (head, rest) = self
            .0
            .split_first_chunk::<N>()
            .ok_or(SchemaError::InvalidPoint("truncated"))?;
        self.0 = rest;
        Ok(*head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> MetricPoint {
        MetricPoint {
            mkey: "7.945276ef3a4124cd5dcd40581a3248db".parse().unwrap(),
            value: 0.25,
            time: 1_700_000_060,
        }
    }

    #[test]
    fn test_encode_with_org_layout() {
        let mut buf = Vec::new();
        point().encode(PointFormat::WithOrg, &mut buf);

        assert_eq!(buf.len(), 33);
        assert_eq!(buf[0], 2);
        assert_eq!(&buf[1..3], &[0x94, 0x52]);
        assert_eq!(&buf[17..21], &[7, 0, 0, 0]);
        assert_eq!(&buf[21..29], &0.25f64.to_le_bytes());
        assert_eq!(&buf[29..33], &1_700_000_060u32.to_le_bytes());
    }

    #[test]
    fn test_encode_without_org_layout() {
        let mut buf = Vec::new();
        point().encode(PointFormat::WithoutOrg, &mut buf);

        assert_eq!(buf.len(), 29);
        assert_eq!(buf[0], 3);
        assert_eq!(&buf[17..25], &0.25f64.to_le_bytes());
    }

    #[test]
    fn test_decode() {
        let mut buf = Vec::new();
        point().encode(PointFormat::WithOrg, &mut buf);
        assert_eq!(
            MetricPoint::decode(&buf).unwrap(),
            (PointFormat::WithOrg, point())
        );

        buf.clear();
        point().encode(PointFormat::WithoutOrg, &mut buf);
        let (format, decoded) = MetricPoint::decode(&buf).unwrap();
        assert_eq!(format, PointFormat::WithoutOrg);
        assert_eq!(decoded.mkey.org, OrganizationId::new(0));
        assert_eq!(decoded.mkey.key, point().mkey.key);
    }

    #[test]
    fn test_decode_invalid() {
        assert!(MetricPoint::decode(&[]).is_err());
        assert!(MetricPoint::decode(&[0x89, 0, 0]).is_err());
        assert!(MetricPoint::decode(&[2; 32]).is_err());
        assert!(MetricPoint::decode(&[3; 30]).is_err());
    }
}
