//! Configuration for the tsgw gateway.
//!
//! The configuration is read from `config.yml` in the config folder. Every section is optional
//! and falls back to defaults:
//!
//! ```yaml
//! logging:
//!   level: info
//! metrics:
//!   statsd: 127.0.0.1:8125
//! kafka:
//!   brokers: [kafka:9092]
//!   topic: mdm
//! publish:
//!   enabled: true
//!   stale_threshold: 21600
//! schemas:
//!   - name: default
//!     pattern: ".*"
//!     retentions: "1m:30d"
//! ```
//!
//! Selected values can be overridden from the command line or the environment, see
//! [`OverridableConfig`].
#![warn(missing_docs)]

mod config;

pub use self::config::*;
