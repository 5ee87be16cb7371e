//! Kafka related functionality.
//!
//! By default, this library provides the configuration types, the [`Partitioner`] and the
//! [`Broker`] abstraction the publisher is written against. With the `producer` feature
//! enabled, [`KafkaBroker`] implements [`Broker`] on top of librdkafka.
//!
//! # Usage
//!
//! ```compile_fail
//!     use tsgw_kafka::{KafkaBroker, ProducerConfig, fetch_partition_count};
//!
//!     let config = ProducerConfig::default();
//!     let broker = KafkaBroker::create(&config)?;
//!
//!     // Partition counts are resolved once at startup.
//!     let partitions = fetch_partition_count(&broker, &config.topic, 3, Duration::from_secs(1))?;
//!     let partitioner = Partitioner::new(config.partition_scheme, partitions)?;
//! ```
#![warn(missing_docs)]

mod broker;
mod config;
mod partitioner;

#[cfg(feature = "producer")]
mod producer;
#[cfg(feature = "producer")]
mod statsd;

pub use self::broker::*;
pub use self::config::*;
pub use self::partitioner::*;

#[cfg(feature = "producer")]
pub use self::producer::*;
