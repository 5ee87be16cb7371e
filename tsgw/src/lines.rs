//! Parsing of carbon plaintext lines.
//!
//! A line has the form `name[;tag=value]* value timestamp`, separated by whitespace.

use thiserror::Error;
use tsgw_schema::{MetricData, OrganizationId};

/// Unit of metrics received as plaintext.
const UNIT: &str = "unknown";
/// Type of metrics received as plaintext.
const MTYPE: &str = "gauge";

/// An error returned for a malformed plaintext line.
#[derive(Debug, Error, PartialEq)]
pub enum LineError {
    /// The line does not consist of exactly three fields.
    #[error("expected 3 fields, found {0}")]
    FieldCount(usize),
    /// The metric name is empty.
    #[error("empty metric name")]
    EmptyName,
    /// A tag is not of the form `key=value` with a non-empty key.
    #[error("invalid tag {0:?}")]
    InvalidTag(String),
    /// The value is not a number.
    #[error("invalid value {0:?}")]
    InvalidValue(String),
    /// The timestamp is not an integer.
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
}

/// Parses a plaintext line into a metric of `org`.
///
/// The interval and id are left unset, the publisher resolves them from the storage schemas.
pub fn parse_line(line: &str, org: OrganizationId) -> Result<MetricData, LineError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [path, value, timestamp] = fields[..] else {
        return Err(LineError::FieldCount(fields.len()));
    };

    let mut parts = path.split(';');
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        return Err(LineError::EmptyName);
    }

    let mut tags = parts
        .map(|tag| match tag.split_once('=') {
            Some((key, _)) if !key.is_empty() => Ok(tag.to_owned()),
            _ => Err(LineError::InvalidTag(tag.to_owned())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    tags.sort_unstable();

    let value = value
        .parse()
        .map_err(|_| LineError::InvalidValue(value.to_owned()))?;
    let time = timestamp
        .parse()
        .map_err(|_| LineError::InvalidTimestamp(timestamp.to_owned()))?;

    Ok(MetricData {
        org_id: org,
        name: name.to_owned(),
        value,
        unit: UNIT.to_owned(),
        time,
        mtype: MTYPE.to_owned(),
        tags,
        ..Default::default()
    })
}
