//! Values that select and tune a generator.
//!
//! These are plain data. [`build_generator`](crate::build_generator) turns a
//! validated [`DistributedIdConfig`] into a running generator; the segment
//! generator also accepts a [`SegmentConfig`] directly.

use core::{fmt, str::FromStr};

use crate::{DEFAULT_EPOCH, Error, Result, validate_worker_identity};

/// Which generator to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Strategy {
    #[default]
    Snowflake,
    Uuid,
    Segment,
}

impl Strategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snowflake => "snowflake",
            Self::Uuid => "uuid",
            Self::Segment => "segment",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snowflake" => Ok(Self::Snowflake),
            "uuid" => Ok(Self::Uuid),
            "segment" => Ok(Self::Segment),
            other => Err(Error::invalid_configuration(format!(
                "unknown id strategy `{other}`, expected snowflake, uuid or segment"
            ))),
        }
    }
}

/// Which kind of shared counter backs the segment strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum SegmentProviderType {
    /// A row per business key in a relational table.
    #[default]
    Db,
    /// A counter per business key in Redis.
    Redis,
}

impl fmt::Display for SegmentProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Db => "db",
            Self::Redis => "redis",
        })
    }
}

impl FromStr for SegmentProviderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "db" => Ok(Self::Db),
            "redis" => Ok(Self::Redis),
            other => Err(Error::invalid_configuration(format!(
                "unknown segment provider `{other}`, expected db or redis"
            ))),
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, rename_all = "kebab-case")
)]
pub struct DistributedIdConfig {
    /// When false, no generator is built.
    pub enabled: bool,
    pub default_strategy: Strategy,
    pub snowflake: SnowflakeConfig,
    pub segment: SegmentConfig,
}

impl Default for DistributedIdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_strategy: Strategy::default(),
            snowflake: SnowflakeConfig::default(),
            segment: SegmentConfig::default(),
        }
    }
}

impl DistributedIdConfig {
    /// Validates the Snowflake settings, and the segment settings when the
    /// segment strategy is selected.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.snowflake.validate()?;
        if self.default_strategy == Strategy::Segment {
            self.segment.validate()?;
        }
        Ok(())
    }
}

/// Settings of the Snowflake strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, rename_all = "kebab-case")
)]
pub struct SnowflakeConfig {
    pub datacenter_id: i64,
    pub worker_id: i64,
    /// Milliseconds since 1970-01-01 UTC that timestamps count from.
    pub epoch_millis: u64,
}

impl Default for SnowflakeConfig {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            datacenter_id: 0,
            worker_id: 0,
            epoch_millis: DEFAULT_EPOCH.as_millis() as u64,
        }
    }
}

impl SnowflakeConfig {
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if either id is outside `[0, 31]`.
    pub fn validate(&self) -> Result<()> {
        validate_worker_identity(self.datacenter_id, self.worker_id)
    }
}

/// Settings of the segment strategy.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, rename_all = "kebab-case")
)]
pub struct SegmentConfig {
    /// Business keys that get a buffer. Fixed for the generator's lifetime.
    pub biz_keys: Vec<String>,
    /// Key used by the keyless generator methods. Must be in `biz_keys`.
    pub default_biz_key: String,
    pub provider_type: SegmentProviderType,
    /// Ids leased per counter increment, for providers that take it from
    /// configuration.
    pub step: i64,
    /// Fraction of a segment in `(0, 1]` after which the standby is
    /// refilled in the background. `1.0` disables background refills.
    pub almost_exhausted_threshold: f64,
    /// Minimum time between filling a segment and a background refill
    /// triggered by consuming it.
    pub preload_interval_millis: u64,
    pub core_pool_size: usize,
    pub max_pool_size: usize,
    /// Idle time after which workers above `core_pool_size` exit.
    pub keep_alive_seconds: u64,
    pub queue_capacity: usize,
    /// Whether a failed preload at startup aborts construction.
    pub require_preload: bool,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            biz_keys: vec![DEFAULT_BIZ_KEY.to_owned()],
            default_biz_key: DEFAULT_BIZ_KEY.to_owned(),
            provider_type: SegmentProviderType::default(),
            step: 1000,
            almost_exhausted_threshold: 0.9,
            preload_interval_millis: 3000,
            core_pool_size: 1,
            max_pool_size: 2,
            keep_alive_seconds: 60,
            queue_capacity: 100,
            require_preload: true,
        }
    }
}

/// Business key used when none is configured.
pub const DEFAULT_BIZ_KEY: &str = "default";

impl SegmentConfig {
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.biz_keys.is_empty() {
            return Err(Error::invalid_configuration(
                "segment strategy needs at least one business key",
            ));
        }
        if self.biz_keys.iter().any(|key| key.trim().is_empty()) {
            return Err(Error::invalid_configuration(
                "business keys must not be blank",
            ));
        }
        if !self.biz_keys.contains(&self.default_biz_key) {
            return Err(Error::invalid_configuration(format!(
                "default business key `{}` is not among the configured keys",
                self.default_biz_key
            )));
        }
        if self.step <= 0 {
            return Err(Error::invalid_configuration(format!(
                "segment step must be positive, got {}",
                self.step
            )));
        }
        // also rejects NaN
        if !(self.almost_exhausted_threshold > 0.0 && self.almost_exhausted_threshold <= 1.0) {
            return Err(Error::invalid_configuration(format!(
                "almost-exhausted threshold must be in (0, 1], got {}",
                self.almost_exhausted_threshold
            )));
        }
        if self.core_pool_size == 0 {
            return Err(Error::invalid_configuration(
                "refill pool needs at least one core thread",
            ));
        }
        if self.max_pool_size < self.core_pool_size {
            return Err(Error::invalid_configuration(format!(
                "max pool size {} is below core pool size {}",
                self.max_pool_size, self.core_pool_size
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::invalid_configuration(
                "refill queue capacity must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(config: &SegmentConfig) {
        assert!(
            matches!(config.validate(), Err(Error::InvalidConfiguration { .. })),
            "{config:?} should be rejected"
        );
    }

    #[test]
    fn defaults_are_valid() {
        let config = DistributedIdConfig::default();
        assert!(config.enabled);
        assert_eq!(config.default_strategy, Strategy::Snowflake);
        assert_eq!(config.snowflake.epoch_millis, 1_704_038_400_000);
        assert_eq!(config.segment.step, 1000);
        assert_eq!(config.segment.default_biz_key, "default");
        config.validate().unwrap();
        config.segment.validate().unwrap();
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("SNOWFLAKE".parse::<Strategy>().unwrap(), Strategy::Snowflake);
        assert_eq!("Uuid".parse::<Strategy>().unwrap(), Strategy::Uuid);
        assert_eq!(" segment ".parse::<Strategy>().unwrap(), Strategy::Segment);
        assert!("leaf".parse::<Strategy>().is_err());
        assert_eq!(Strategy::Segment.to_string(), "segment");

        assert_eq!(
            "Redis".parse::<SegmentProviderType>().unwrap(),
            SegmentProviderType::Redis
        );
        assert!("mongo".parse::<SegmentProviderType>().is_err());
    }

    #[test]
    fn rejects_out_of_range_worker_identity() {
        for (datacenter_id, worker_id) in [(32, 0), (0, 32), (-1, 0)] {
            let config = DistributedIdConfig {
                snowflake: SnowflakeConfig {
                    datacenter_id,
                    worker_id,
                    ..SnowflakeConfig::default()
                },
                ..DistributedIdConfig::default()
            };
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn segment_rules() {
        let base = SegmentConfig::default();

        assert_invalid(&SegmentConfig {
            biz_keys: vec![],
            ..base.clone()
        });
        assert_invalid(&SegmentConfig {
            biz_keys: vec!["default".into(), " ".into()],
            ..base.clone()
        });
        assert_invalid(&SegmentConfig {
            default_biz_key: "order".into(),
            ..base.clone()
        });
        assert_invalid(&SegmentConfig {
            step: 0,
            ..base.clone()
        });
        for threshold in [0.0, -0.5, 1.01, f64::NAN] {
            assert_invalid(&SegmentConfig {
                almost_exhausted_threshold: threshold,
                ..base.clone()
            });
        }
        assert_invalid(&SegmentConfig {
            core_pool_size: 0,
            ..base.clone()
        });
        assert_invalid(&SegmentConfig {
            core_pool_size: 3,
            max_pool_size: 2,
            ..base.clone()
        });
        assert_invalid(&SegmentConfig {
            queue_capacity: 0,
            ..base.clone()
        });

        SegmentConfig {
            almost_exhausted_threshold: 1.0,
            ..base
        }
        .validate()
        .unwrap();
    }

    #[test]
    fn segment_rules_only_apply_to_segment_strategy() {
        let mut config = DistributedIdConfig {
            segment: SegmentConfig {
                biz_keys: vec![],
                ..SegmentConfig::default()
            },
            ..DistributedIdConfig::default()
        };
        config.validate().unwrap();

        config.default_strategy = Strategy::Segment;
        assert!(config.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_kebab_case_with_defaults() {
        let config: DistributedIdConfig = serde_json::from_str(
            r#"{
                "default-strategy": "segment",
                "snowflake": { "datacenter-id": 3, "worker-id": 7 },
                "segment": {
                    "biz-keys": ["order", "user"],
                    "default-biz-key": "order",
                    "provider-type": "redis",
                    "step": 500
                }
            }"#,
        )
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.default_strategy, Strategy::Segment);
        assert_eq!(config.snowflake.datacenter_id, 3);
        assert_eq!(config.snowflake.worker_id, 7);
        assert_eq!(config.snowflake.epoch_millis, 1_704_038_400_000);
        assert_eq!(config.segment.biz_keys, ["order", "user"]);
        assert_eq!(config.segment.provider_type, SegmentProviderType::Redis);
        assert_eq!(config.segment.step, 500);
        assert_eq!(config.segment.queue_capacity, 100);
        config.validate().unwrap();
    }
}
