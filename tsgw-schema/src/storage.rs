use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::SchemaError;

/// Patterns accepted as a catch-all storage schema.
const CATCH_ALL_PATTERNS: &[&str] = &["", ".*", "^.*$"];

/// A single archive of a storage schema: resolution and time to live.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Retention {
    /// Seconds between two points.
    pub seconds_per_point: u32,
    /// How long points are kept, in seconds.
    pub ttl: u32,
}

impl Retention {
    /// Parses a retention of the form `10s:1d`.
    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        let invalid = || SchemaError::InvalidRetention(s.to_owned());

        let (resolution, ttl) = s.trim().split_once(':').ok_or_else(invalid)?;
        let seconds_per_point = parse_seconds(resolution).ok_or_else(invalid)?;
        let ttl = parse_seconds(ttl).ok_or_else(invalid)?;

        if seconds_per_point == 0 || ttl < seconds_per_point {
            return Err(invalid());
        }

        Ok(Self {
            seconds_per_point,
            ttl,
        })
    }

    /// Returns the number of points kept by this archive.
    pub fn points(&self) -> u32 {
        self.ttl / self.seconds_per_point
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s:{}s", self.seconds_per_point, self.ttl)
    }
}

/// Parses a number with an optional unit suffix into seconds.
///
/// A bare number is interpreted as seconds.
fn parse_seconds(s: &str) -> Option<u32> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let multiplier = match unit {
        "" | "s" | "sec" => 1,
        "m" | "min" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        "y" => 365 * 24 * 60 * 60,
        _ => return None,
    };

    number.parse::<u32>().ok()?.checked_mul(multiplier)
}

/// The configuration of a single storage schema, as written in the config file.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct StorageSchemaConfig {
    /// A descriptive name, used in error messages.
    pub name: String,
    /// Regular expression matched against metric names.
    #[serde(default)]
    pub pattern: String,
    /// Comma separated retentions, the finest resolution first. For example `10s:1d,1m:30d`.
    pub retentions: String,
}

impl Default for StorageSchemaConfig {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            pattern: ".*".to_owned(),
            retentions: "1m:30d".to_owned(),
        }
    }
}

/// A compiled storage schema.
#[derive(Clone, Debug)]
pub struct StorageSchema {
    /// Name of the schema.
    pub name: String,
    /// The compiled pattern.
    pub pattern: Regex,
    /// Retentions, the finest resolution first. Never empty.
    pub retentions: Vec<Retention>,
}

impl StorageSchema {
    /// Compiles a schema from its configuration.
    pub fn from_config(config: &StorageSchemaConfig) -> Result<Self, SchemaError> {
        let pattern = Regex::new(&config.pattern).map_err(|source| SchemaError::InvalidPattern {
            name: config.name.clone(),
            source,
        })?;

        let retentions = config
            .retentions
            .split(',')
            .filter(|r| !r.trim().is_empty())
            .map(Retention::parse)
            .collect::<Result<Vec<_>, _>>()?;

        if retentions.is_empty() {
            return Err(SchemaError::EmptyRetentions(config.name.clone()));
        }

        Ok(Self {
            name: config.name.clone(),
            pattern,
            retentions,
        })
    }

    /// The interval of metrics stored under this schema.
    pub fn interval(&self) -> u32 {
        // Non-empty by construction.
        self.retentions
            .first()
            .map_or(0, |retention| retention.seconds_per_point)
    }

    fn is_catch_all(&self) -> bool {
        CATCH_ALL_PATTERNS.contains(&self.pattern.as_str())
    }
}

/// An ordered list of storage schemas ending in a catch-all.
#[derive(Clone, Debug)]
pub struct StorageSchemas(Vec<StorageSchema>);

impl StorageSchemas {
    /// Compiles and validates a list of schema configurations.
    ///
    /// The last schema must be a catch-all pattern, so that every metric name matches.
    pub fn new(configs: &[StorageSchemaConfig]) -> Result<Self, SchemaError> {
        let schemas = configs
            .iter()
            .map(StorageSchema::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        match schemas.last() {
            Some(last) if last.is_catch_all() => Ok(Self(schemas)),
            _ => Err(SchemaError::MissingCatchAll),
        }
    }

    /// Returns the first schema whose pattern matches `name`.
    ///
    /// Falls back to the catch-all, so this always returns a schema.
    pub fn match_name(&self, name: &str) -> &StorageSchema {
        let catch_all = &self.0[self.0.len() - 1];
        self.0
            .iter()
            .find(|schema| schema.pattern.is_match(name))
            // `.*` does not match across newlines.
            .unwrap_or(catch_all)
    }

    /// Returns the schemas in matching order.
    pub fn iter(&self) -> impl Iterator<Item = &StorageSchema> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn config(name: &str, pattern: &str, retentions: &str) -> StorageSchemaConfig {
        StorageSchemaConfig {
            name: name.to_owned(),
            pattern: pattern.to_owned(),
            retentions: retentions.to_owned(),
        }
    }

    #[test]
    fn test_parse_retention() {
        let retention = Retention::parse("10s:1d").unwrap();
        assert_eq!(retention.seconds_per_point, 10);
        assert_eq!(retention.ttl, 86400);
        assert_eq!(retention.points(), 8640);

        assert_eq!(Retention::parse("1min:2w").unwrap().seconds_per_point, 60);
        assert_eq!(Retention::parse("60:3600").unwrap().ttl, 3600);
        assert_eq!(Retention::parse(" 1h:1y ").unwrap().ttl, 31_536_000);
    }

    #[test]
    fn test_parse_retention_invalid() {
        for retention in ["", "10s", "10x:1d", "0s:1d", "1d:1h", "s:1d", "10s:99999999y"] {
            assert!(
                Retention::parse(retention).is_err(),
                "{retention:?} should not parse"
            );
        }
    }

    #[test]
    fn test_match_first_wins() {
        let schemas = StorageSchemas::new(&[
            config("fast", "^fast\\.", "1s:1h,10s:1d"),
            config("fast-and-tagged", "^fast\\.tagged", "5s:1h"),
            config("default", ".*", "1m:30d"),
        ])
        .unwrap();

        assert_eq!(schemas.match_name("fast.tagged.x").name.as_str(), "fast");
        assert_eq!(schemas.match_name("fast.tagged.x").interval(), 1);
        assert_eq!(schemas.match_name("slow.x").name.as_str(), "default");
        assert_eq!(schemas.match_name("slow.x").interval(), 60);
        assert_eq!(schemas.iter().count(), 3);
    }

    #[test]
    fn test_missing_catch_all() {
        let result = StorageSchemas::new(&[config("fast", "^fast\\.", "1s:1h")]);
        assert!(matches!(result, Err(SchemaError::MissingCatchAll)));

        let result = StorageSchemas::new(&[]);
        assert!(matches!(result, Err(SchemaError::MissingCatchAll)));

        // A catch-all that is not last does not count.
        let result = StorageSchemas::new(&[
            config("default", ".*", "1m:30d"),
            config("fast", "^fast\\.", "1s:1h"),
        ]);
        assert!(matches!(result, Err(SchemaError::MissingCatchAll)));
    }

    #[test]
    fn test_catch_all_variants() {
        for pattern in ["", ".*", "^.*$"] {
            let schemas = StorageSchemas::new(&[config("default", pattern, "10s:1d")]).unwrap();
            assert_eq!(schemas.match_name("anything").interval(), 10);
        }
    }

    #[test]
    fn test_invalid_pattern_and_retentions() {
        let result = StorageSchemas::new(&[config("broken", "(", "1s:1h")]);
        assert!(matches!(result, Err(SchemaError::InvalidPattern { .. })));

        let result = StorageSchemas::new(&[config("empty", ".*", " ")]);
        assert!(matches!(result, Err(SchemaError::EmptyRetentions(_))));
    }

    #[test]
    fn test_default_schemas() {
        let schemas = StorageSchemas::new(&[StorageSchemaConfig::default()]).unwrap();
        assert_eq!(schemas.match_name("host.cpu.load").interval(), 60);
    }

    #[test]
    fn test_deserialize_config() {
        let configs: Vec<StorageSchemaConfig> = serde_yaml::from_str(
            r#"
- name: carbon
  pattern: "^carbon\\."
  retentions: "10s:1d"
- name: default
  retentions: "1m:30d"
"#,
        )
        .unwrap();

        assert_eq!(configs[1].pattern, "");
        let schemas = StorageSchemas::new(&configs).unwrap();
        assert_eq!(schemas.match_name("carbon.agents.x").interval(), 10);
    }
}
