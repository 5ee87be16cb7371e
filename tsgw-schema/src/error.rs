use thiserror::Error;

/// An error returned when parsing, encoding or decoding schema types.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The metric id is not of the form `<org>.<32 hex digits>`.
    #[error("invalid metric id {0:?}")]
    InvalidId(String),

    /// The metric could not be serialized into the full message format.
    #[error("failed to encode metric")]
    Encode(#[from] rmp_serde::encode::Error),

    /// The metric could not be deserialized from the full message format.
    #[error("failed to decode metric")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The payload is not a valid compact point message.
    #[error("invalid point message: {0}")]
    InvalidPoint(&'static str),

    /// A retention definition could not be parsed.
    #[error("invalid retention {0:?}")]
    InvalidRetention(String),

    /// A storage schema has no retentions.
    #[error("storage schema {0:?} has no retentions")]
    EmptyRetentions(String),

    /// The pattern of a storage schema is not a valid regular expression.
    #[error("storage schema {name:?} has an invalid pattern")]
    InvalidPattern {
        /// Name of the offending schema.
        name: String,
        /// The regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// The last storage schema does not match every metric name.
    #[error("the last storage schema must be a catch-all pattern like '.*'")]
    MissingCatchAll,
}
