use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tsgw_kafka::{PartitionScheme, ProducerConfig};
use tsgw_keycache::{KeyCacheConfig, MAX_SHARD_COUNT};
use tsgw_schema::{StorageSchemaConfig, StorageSchemas};

type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Where the offending value of a [`ConfigError`] came from.
#[derive(Debug)]
enum Origin {
    Unknown,
    File(PathBuf),
    /// A command line argument or its environment variable.
    Override(&'static str),
}

/// A configuration that could not be loaded or is invalid.
#[derive(Debug)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    origin: Origin,
    cause: Option<BoxError>,
}

impl ConfigError {
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            kind,
            origin: Origin::Unknown,
            cause: None,
        }
    }

    fn wrap(cause: impl Into<BoxError>, kind: ConfigErrorKind) -> Self {
        Self {
            cause: Some(cause.into()),
            ..Self::new(kind)
        }
    }

    fn in_file(self, path: &Path) -> Self {
        Self {
            origin: Origin::File(path.to_owned()),
            ..self
        }
    }

    fn at(self, field: &'static str) -> Self {
        Self {
            origin: Origin::Override(field),
            ..self
        }
    }

    /// What went wrong.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        match &self.origin {
            Origin::Unknown => Ok(()),
            Origin::File(path) => write!(f, " (file {})", path.display()),
            Origin::Override(field) => write!(f, " (field {field})"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn Error + 'static))
    }
}

/// The reason a [`ConfigError`] was raised.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// The config file exists but cannot be read.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// The config cannot be rendered as YAML.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// The config file is not valid YAML or has unknown values.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// A value is out of range or contradicts another one.
    #[error("invalid config value")]
    InvalidValue,
    /// The storage schemas do not compile or lack a catch-all.
    #[error("invalid storage schemas")]
    InvalidSchemas,
    /// Publishing is enabled in a build without the `kafka` feature.
    #[error("was not compiled with kafka, cannot enable publishing")]
    KafkaNotAvailable,
}

/// Controls internal reporting to statsd.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
struct Metrics {
    /// `host:port` of the StatsD server. Internal metrics are off when unset.
    statsd: Option<String>,
    /// Prepended to every metric name.
    prefix: String,
    /// Tags sent with every metric, such as the deployment region.
    default_tags: BTreeMap<String, String>,
    /// Fraction of metrics that are sent, from `0.0` to `1.0`.
    sample_rate: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: "tsgw".into(),
            default_tags: BTreeMap::new(),
            sample_rate: 1.0,
        }
    }
}

/// Controls the publish pipeline.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
struct Publish {
    /// Publish metrics to kafka. When disabled, all metrics are dropped.
    enabled: bool,
    /// Send compact points for series that have been described recently.
    compact_encoding: bool,
    /// Include the organization id in compact points.
    compact_with_org: bool,
    /// Seconds after which an unseen series is described in full again. At most 40 hours.
    stale_threshold: u64,
    /// Seconds between two prunes of the series cache. At most 40 hours.
    prune_interval: u64,
    /// Number of lock stripes per organization in the series cache.
    shard_count: usize,
    /// Seconds to wait for the next delivery report of a batch. Waits indefinitely if unset.
    ack_timeout: Option<u64>,
    /// Number of idle message buffers kept per encoding.
    buffer_pool_size: usize,
}

impl Default for Publish {
    fn default() -> Self {
        Self {
            enabled: false,
            compact_encoding: true,
            compact_with_org: true,
            stale_threshold: 6 * 60 * 60,
            prune_interval: 60 * 60,
            shard_count: MAX_SHARD_COUNT,
            ack_timeout: None,
            buffer_pool_size: 1024,
        }
    }
}

fn default_schemas() -> Vec<StorageSchemaConfig> {
    vec![StorageSchemaConfig::default()]
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ConfigValues {
    #[serde(default)]
    logging: tsgw_log::LogConfig,
    #[serde(default)]
    metrics: Metrics,
    #[serde(default)]
    kafka: ProducerConfig,
    #[serde(default)]
    publish: Publish,
    #[serde(default = "default_schemas")]
    schemas: Vec<StorageSchemaConfig>,
}

impl Default for ConfigValues {
    fn default() -> Self {
        Self {
            logging: Default::default(),
            metrics: Default::default(),
            kafka: Default::default(),
            publish: Default::default(),
            schemas: default_schemas(),
        }
    }
}

/// Values that can be overridden from the command line or environment variables.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The kafka `bootstrap.servers`, comma separated.
    pub kafka_url: Option<String>,
    /// The topic metrics are published to.
    pub topic: Option<String>,
    /// "true" if publishing is enabled "false" otherwise.
    pub publish: Option<String>,
    /// The statsd server, `host:port`.
    pub statsd: Option<String>,
}

/// Config struct.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// The basename of the config file within the config folder.
    pub const FILE_NAME: &'static str = "config.yml";

    /// Reads `config.yml` from the folder at `path`, relative to the working directory.
    ///
    /// A missing `config.yml` yields the default configuration.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = std::env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let file = path.join(Self::FILE_NAME);
        let values = match fs::read_to_string(&file) {
            Ok(contents) => serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).in_file(&file))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => ConfigValues::default(),
            Err(e) => {
                return Err(ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).in_file(&file));
            }
        };

        let config = Config { values, path };
        config.check_kafka_available()?;
        Ok(config)
    }

    /// Creates a config from a YAML string.
    ///
    /// This is mostly useful for tests.
    pub fn from_yaml_str(yaml: &str) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_yaml::from_str(yaml)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml))?,
            path: PathBuf::new(),
        })
    }

    fn check_kafka_available(&self) -> Result<(), ConfigError> {
        if cfg!(not(feature = "kafka")) && self.publish_enabled() {
            return Err(ConfigError::new(ConfigErrorKind::KafkaNotAvailable).in_file(&self.path));
        }
        Ok(())
    }

    /// Applies command line arguments and their environment variables on top of the file.
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let kafka = &mut self.values.kafka;

        if let Some(kafka_url) = overrides.kafka_url {
            kafka.brokers = kafka_url
                .split(',')
                .map(str::trim)
                .filter(|broker| !broker.is_empty())
                .map(str::to_owned)
                .collect();

            // An explicit override wins over raw parameters from the file.
            kafka.params.retain(|param| param.name != "bootstrap.servers");
        }

        if let Some(topic) = overrides.topic {
            kafka.topic = topic;
        }

        if let Some(enabled) = overrides.publish {
            self.values.publish.enabled = match enabled.to_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" | "" => false,
                _ => {
                    return Err(ConfigError::new(ConfigErrorKind::InvalidValue).at("publish"));
                }
            };
            self.check_kafka_available()?;
        }

        if let Some(statsd) = overrides.statsd {
            self.values.metrics.statsd = Some(statsd);
        }

        Ok(self)
    }

    /// Validates all values that are not checked while parsing.
    ///
    /// This is called once at startup before any traffic is accepted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.key_cache_config()
            .validate()
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::InvalidValue).in_file(&self.path))?;

        self.storage_schemas()?;

        if self.publish_enabled() {
            self.values.kafka.validate().map_err(|e| {
                ConfigError::wrap(e, ConfigErrorKind::InvalidValue).in_file(&self.path)
            })?;
        }

        let publish = &self.values.publish;
        if publish.compact_encoding
            && !publish.compact_with_org
            && self.values.kafka.partition_scheme != PartitionScheme::ByOrg
        {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue)
                .at("publish.compact_with_org"));
        }

        let sample_rate = self.values.metrics.sample_rate;
        if !(0.0..=1.0).contains(&sample_rate) {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).at("metrics.sample_rate"));
        }

        Ok(())
    }

    /// The config folder, empty for configs not loaded from disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renders the effective configuration, including defaults, as YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// The `logging` section.
    pub fn logging(&self) -> &tsgw_log::LogConfig {
        &self.values.logging
    }

    /// Resolves the StatsD server, empty if internal metrics are off.
    pub fn statsd_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        let Some(host) = self.values.metrics.statsd.as_deref() else {
            return Ok(Vec::new());
        };

        host.to_socket_addrs()
            .map(Iterator::collect)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::InvalidValue).in_file(&self.path))
    }

    /// Prefix of all internal metric names.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Tags sent with every internal metric.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Fraction of internal metrics that are sent.
    pub fn metrics_sample_rate(&self) -> f64 {
        self.values.metrics.sample_rate
    }

    /// Returns the kafka producer configuration.
    pub fn producer_config(&self) -> &ProducerConfig {
        &self.values.kafka
    }

    /// True if metrics are published to kafka.
    pub fn publish_enabled(&self) -> bool {
        self.values.publish.enabled
    }

    /// True if recently described series are sent as compact points.
    pub fn compact_encoding(&self) -> bool {
        self.values.publish.compact_encoding
    }

    /// True if compact points carry the organization id.
    pub fn compact_with_org(&self) -> bool {
        self.values.publish.compact_with_org
    }

    /// Returns the configuration of the series cache.
    pub fn key_cache_config(&self) -> KeyCacheConfig {
        let publish = &self.values.publish;
        KeyCacheConfig {
            stale_threshold: Duration::from_secs(publish.stale_threshold),
            prune_interval: Duration::from_secs(publish.prune_interval),
            shard_count: publish.shard_count,
        }
    }

    /// Returns the maximum time to wait for the next delivery report of a batch.
    pub fn ack_timeout(&self) -> Option<Duration> {
        self.values.publish.ack_timeout.map(Duration::from_secs)
    }

    /// Returns the number of idle buffers retained per encoding.
    pub fn buffer_pool_size(&self) -> usize {
        self.values.publish.buffer_pool_size
    }

    /// Compiles the storage schemas.
    pub fn storage_schemas(&self) -> Result<StorageSchemas, ConfigError> {
        StorageSchemas::new(&self.values.schemas)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::InvalidSchemas).in_file(&self.path))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            values: ConfigValues::default(),
            path: PathBuf::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use tsgw_kafka::CompressionCodec;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml_str("{}").unwrap();

        assert!(!config.publish_enabled());
        assert!(config.compact_encoding());
        assert!(config.compact_with_org());
        assert_eq!(config.key_cache_config(), KeyCacheConfig::default());
        assert_eq!(config.ack_timeout(), None);
        assert_eq!(config.producer_config().topic, "mdm");
        assert_eq!(config.metrics_prefix(), "tsgw");
        assert!(config.statsd_addrs().unwrap().is_empty());
        assert_eq!(
            config.storage_schemas().unwrap().match_name("a.b").interval(),
            60
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_publish_section_snapshot() {
        let config = Config::from_yaml_str(
            r#"
publish:
  enabled: true
  compact_with_org: false
  stale_threshold: 7200
  ack_timeout: 30
"#,
        )
        .unwrap();

        insta::assert_json_snapshot!(config.values.publish, @r###"
        {
          "enabled": true,
          "compact_encoding": true,
          "compact_with_org": false,
          "stale_threshold": 7200,
          "prune_interval": 3600,
          "shard_count": 256,
          "ack_timeout": 30,
          "buffer_pool_size": 1024
        }
        "###);

        assert_eq!(config.ack_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_yaml_str(
            r#"
logging:
  level: debug
  format: json
metrics:
  statsd: 127.0.0.1:8125
  prefix: gw
kafka:
  brokers: [kafka:9092]
  topic: metrics
  compression: lz4
  partition_scheme: by-org
publish:
  enabled: true
  shard_count: 16
schemas:
  - name: carbon
    pattern: "^carbon\\."
    retentions: "10s:1d"
  - name: default
    pattern: ".*"
    retentions: "1m:30d"
"#,
        )
        .unwrap();

        assert_eq!(config.logging().level, tsgw_log::Level::Debug);
        assert_eq!(config.logging().format, tsgw_log::LogFormat::Json);
        assert_eq!(config.statsd_addrs().unwrap().len(), 1);
        assert_eq!(config.metrics_prefix(), "gw");
        assert_eq!(config.producer_config().compression, CompressionCodec::Lz4);
        assert_eq!(
            config.producer_config().partition_scheme,
            PartitionScheme::ByOrg
        );
        assert_eq!(config.key_cache_config().shard_count, 16);

        let schemas = config.storage_schemas().unwrap();
        assert_eq!(schemas.match_name("carbon.agents.a").interval(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_long_stale_threshold() {
        let config = Config::from_yaml_str("publish: {stale_threshold: 150000}").unwrap();
        let error = config.validate().unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert!(error.source().is_some());
    }

    #[test]
    fn test_rejects_missing_catch_all() {
        let config = Config::from_yaml_str(
            r#"
schemas:
  - name: carbon
    pattern: "^carbon\\."
    retentions: "10s:1d"
"#,
        )
        .unwrap();

        let error = config.validate().unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidSchemas);
    }

    #[test]
    fn test_compact_without_org_requires_org_partitioning() {
        let config = Config::from_yaml_str("publish: {compact_with_org: false}").unwrap();
        let error = config.validate().unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid config value (field publish.compact_with_org)"
        );

        let config = Config::from_yaml_str(
            "publish: {compact_with_org: false}\nkafka: {partition_scheme: byOrg}",
        )
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        let error = Config::from_yaml_str("kafka: {partition_scheme: by-host}").unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
    }

    #[test]
    fn test_rejects_empty_brokers_when_publishing() {
        let config = Config::from_yaml_str("kafka: {brokers: []}").unwrap();
        assert!(config.validate().is_ok());

        let config =
            Config::from_yaml_str("kafka: {brokers: []}\npublish: {enabled: true}").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::from_yaml_str(
            r#"
kafka:
  params:
    - name: bootstrap.servers
      value: old:9092
    - name: client.id
      value: gw
"#,
        )
        .unwrap();

        config
            .apply_override(OverridableConfig {
                kafka_url: Some("a:9092, b:9092".to_owned()),
                topic: Some("metrics".to_owned()),
                statsd: Some("127.0.0.1:8125".to_owned()),
                ..Default::default()
            })
            .unwrap();

        let kafka = config.producer_config();
        assert_eq!(kafka.brokers, vec!["a:9092".to_owned(), "b:9092".to_owned()]);
        assert_eq!(kafka.topic, "metrics");
        assert_eq!(kafka.params.len(), 1);
        assert_eq!(config.statsd_addrs().unwrap().len(), 1);

        let error = config
            .apply_override(OverridableConfig {
                publish: Some("maybe".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(error.to_string(), "invalid config value (field publish)");
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();

        // Missing file falls back to the defaults.
        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.producer_config().topic, "mdm");

        fs::write(dir.path().join(Config::FILE_NAME), "kafka: {topic: other}").unwrap();
        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.producer_config().topic, "other");

        fs::write(dir.path().join(Config::FILE_NAME), "kafka: [").unwrap();
        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
        assert!(error.to_string().contains("config.yml"));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = config.to_yaml_string().unwrap();
        let parsed = Config::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.values, config.values);
    }
}
