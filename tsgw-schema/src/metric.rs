use std::io::Write as _;

use serde::{Deserialize, Serialize};

use crate::{MetricKey, MetricPoint, OrganizationId, SchemaError};

/// The full description of a single sample.
///
/// Field names follow the established wire format, which is shared with downstream consumers.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricData {
    /// The metric id, `<org>.<series key>`. Computed by [`set_id`](Self::set_id).
    pub id: String,
    /// The organization that owns the series.
    pub org_id: OrganizationId,
    /// The metric name, for example `host.cpu.load`.
    pub name: String,
    /// Seconds between two points. `0` means the interval has not been resolved yet.
    pub interval: u32,
    /// The sample value.
    pub value: f64,
    /// The unit of the value, for example `ms`.
    pub unit: String,
    /// Unix timestamp of the sample in seconds.
    pub time: i64,
    /// The metric type, for example `gauge` or `counter`.
    pub mtype: String,
    /// Tags in `key=value` form.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl MetricData {
    /// Sorts and deduplicates the tags.
    pub fn normalize_tags(&mut self) {
        self.tags.sort_unstable();
        self.tags.dedup();
    }

    /// Normalizes the tags and computes the metric id from the series identity.
    ///
    /// The digest covers name, unit, type, interval and the sorted tags. Value and time do not
    /// contribute, so every sample of a series yields the same id.
    pub fn set_id(&mut self) {
        self.normalize_tags();

        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(self.name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.unit.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.mtype.as_bytes());
        buf.push(0);
        // Writing into a vector cannot fail.
        let _ = write!(buf, "{}", self.interval);
        for tag in &self.tags {
            buf.push(0);
            buf.extend_from_slice(tag.as_bytes());
        }

        self.id = format!("{}.{:x}", self.org_id, md5::compute(&buf));
    }

    /// Parses the series key out of the metric id.
    pub fn metric_key(&self) -> Result<MetricKey, SchemaError> {
        self.id.parse()
    }

    /// Returns the compact point for this sample.
    pub fn to_point(&self) -> Result<MetricPoint, SchemaError> {
        Ok(MetricPoint {
            mkey: self.metric_key()?,
            value: self.value,
            // Timestamps are 32 bit on the wire.
            time: self.time as u32,
        })
    }

    /// Appends the little-endian organization id to `buf`.
    pub fn key_by_org(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.org_id.to_le_bytes());
    }

    /// Appends the metric name to `buf`.
    pub fn key_by_series(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.name.as_bytes());
    }

    /// Appends the metric name followed by `;tag` for every tag to `buf`.
    ///
    /// Tags are expected to be normalized.
    pub fn key_by_series_with_tags(&self, buf: &mut Vec<u8>) {
        self.key_by_series(buf);
        for tag in &self.tags {
            buf.push(b';');
            buf.extend_from_slice(tag.as_bytes());
        }
    }

    /// Appends the full MessagePack encoding of this metric to `buf`.
    pub fn encode_full(&self, buf: &mut Vec<u8>) -> Result<(), SchemaError> {
        rmp_serde::encode::write_named(buf, self)?;
        Ok(())
    }

    /// Decodes a metric from its full MessagePack encoding.
    pub fn decode_full(bytes: &[u8]) -> Result<Self, SchemaError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
