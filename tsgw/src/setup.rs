use std::sync::Arc;

use anyhow::{Context, Result};
use tsgw_config::Config;
use tsgw_keycache::{KeyCache, PrunerHandle};
use tsgw_publish::{NullPublisher, Publish};
use tsgw_statsd::MetricsClientConfig;

/// Validates the configuration before any traffic is accepted.
pub fn check_config(config: &Config) -> Result<()> {
    config.validate()?;

    if config.publish_enabled() && !config.compact_encoding() {
        tsgw_log::warn!("compact encoding is disabled, all metrics are sent in full");
    }

    Ok(())
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        tsgw_log::info!("launching gateway without config folder");
    } else {
        tsgw_log::info!(
            "launching gateway from config folder {}",
            config.path().display()
        );
    }

    tsgw_log::info!("  log level: {}", config.logging().level);
    if config.publish_enabled() {
        let kafka = config.producer_config();
        tsgw_log::info!("  brokers: {}", kafka.brokers.join(","));
        tsgw_log::info!("  topic: {}", kafka.topic);
        tsgw_log::info!("  partition scheme: {}", kafka.partition_scheme);
        tsgw_log::info!("  compression: {}", kafka.compression);
    } else {
        tsgw_log::info!("  publishing: disabled");
    }
}

/// Initialize the metric system.
pub fn init_metrics(config: &Config) -> Result<()> {
    let addrs = config.statsd_addrs()?;
    if addrs.is_empty() {
        return Ok(());
    }

    tsgw_statsd::init(MetricsClientConfig {
        prefix: config.metrics_prefix(),
        host: addrs.as_slice(),
        default_tags: config.metrics_default_tags().clone(),
        default_sample_rate: config.metrics_sample_rate().into(),
    })
    .context("failed to initialize statsd")?;

    Ok(())
}

/// The publisher and the background tasks it depends on.
pub struct Pipeline {
    pub publisher: Box<dyn Publish>,
    pub pruner: Option<PrunerHandle>,
}

impl Pipeline {
    /// Stops the background pruner.
    pub fn shutdown(self) {
        if let Some(pruner) = self.pruner {
            pruner.shutdown();
        }
    }
}

/// Creates the key cache and its pruner if compact encoding is enabled.
#[cfg_attr(not(feature = "kafka"), allow(dead_code))]
fn init_key_cache(config: &Config) -> Result<(Option<Arc<KeyCache>>, Option<PrunerHandle>)> {
    if !config.compact_encoding() {
        return Ok((None, None));
    }

    let key_cache = Arc::new(KeyCache::new(&config.key_cache_config())?);
    let pruner = key_cache
        .spawn_pruner()
        .context("failed to spawn key cache pruner")?;

    Ok((Some(key_cache), Some(pruner)))
}

#[cfg(feature = "kafka")]
fn init_kafka(config: &Config) -> Result<Pipeline> {
    use std::time::Duration;

    use tsgw_kafka::{KafkaBroker, Partitioner, fetch_partition_count};
    use tsgw_publish::{Publisher, PublisherConfig};

    /// Attempts to fetch the partitions of a freshly created topic.
    const METADATA_ATTEMPTS: u32 = 3;

    let kafka = config.producer_config();
    let broker = KafkaBroker::create(kafka)?;
    let partitions = fetch_partition_count(
        &broker,
        &kafka.topic,
        METADATA_ATTEMPTS,
        Duration::from_secs(1),
    )?;
    let partitioner = Partitioner::new(kafka.partition_scheme, partitions)?;
    let (key_cache, pruner) = init_key_cache(config)?;

    tsgw_log::info!(
        topic = kafka.topic,
        partitions,
        compact = key_cache.is_some(),
        "using kafka publisher"
    );

    let publisher = Publisher::new(
        broker,
        partitioner,
        config.storage_schemas()?,
        key_cache,
        PublisherConfig {
            topic: kafka.topic.clone(),
            compact_with_org: config.compact_with_org(),
            ack_timeout: config.ack_timeout(),
            buffer_pool_size: config.buffer_pool_size(),
        },
    );

    Ok(Pipeline {
        publisher: Box::new(publisher),
        pruner,
    })
}

#[cfg(not(feature = "kafka"))]
fn init_kafka(_config: &Config) -> Result<Pipeline> {
    anyhow::bail!("tsgw was not compiled with kafka, cannot enable publishing")
}

/// Builds the publisher from the configuration.
pub fn init_pipeline(config: &Config) -> Result<Pipeline> {
    let pipeline = if config.publish_enabled() {
        init_kafka(config)?
    } else {
        Pipeline {
            publisher: Box::new(NullPublisher),
            pruner: None,
        }
    };

    tsgw_log::info!("using {} publisher", pipeline.publisher.kind());
    Ok(pipeline)
}
