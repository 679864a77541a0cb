//! Explicit assembly of the configured generator.

#[cfg(feature = "snowflake")]
use core::time::Duration;
#[cfg(feature = "segment")]
use std::sync::Arc;

#[cfg(feature = "segment")]
use crate::{SegmentIdGenerator, SegmentProvider};
#[cfg(feature = "snowflake")]
use crate::{SnowflakeIdGenerator, StaticWorkerIdAssigner};
#[cfg(feature = "uuid")]
use crate::UuidGenerator;
#[cfg(any(feature = "snowflake", feature = "segment"))]
use crate::SystemClock;
use crate::{DistributedIdConfig, Error, IdGenerator, Result, Strategy, WorkerIdAssigner};

/// External collaborators a generator may need.
///
/// Anything left `None` falls back to what the configuration alone can
/// provide: the Snowflake identity comes from [`SnowflakeConfig`], while the
/// segment strategy has no fallback and requires a provider.
///
/// [`SnowflakeConfig`]: crate::SnowflakeConfig
#[derive(Default)]
pub struct Collaborators {
    pub assigner: Option<Box<dyn WorkerIdAssigner + Send + Sync>>,
    #[cfg_attr(docsrs, doc(cfg(feature = "segment")))]
    #[cfg(feature = "segment")]
    pub provider: Option<Arc<dyn SegmentProvider>>,
}

impl Collaborators {
    #[must_use]
    pub fn with_assigner(mut self, assigner: impl WorkerIdAssigner + Send + Sync + 'static) -> Self {
        self.assigner = Some(Box::new(assigner));
        self
    }

    #[cfg_attr(docsrs, doc(cfg(feature = "segment")))]
    #[cfg(feature = "segment")]
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn SegmentProvider>) -> Self {
        self.provider = Some(provider);
        self
    }
}

impl core::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut s = f.debug_struct("Collaborators");
        s.field("assigner", &self.assigner.is_some());
        #[cfg(feature = "segment")]
        s.field("provider", &self.provider.is_some());
        s.finish()
    }
}

/// The generator [`build_generator`] produced.
///
/// Implements [`IdGenerator`] by delegation, and still lets callers reach the
/// strategy specific API (e.g. keyed segment ids).
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfiguredGenerator {
    #[cfg(feature = "snowflake")]
    Snowflake(SnowflakeIdGenerator),
    #[cfg(feature = "uuid")]
    Uuid(UuidGenerator),
    #[cfg(feature = "segment")]
    Segment(SegmentIdGenerator),
}

impl ConfiguredGenerator {
    pub const fn strategy(&self) -> Strategy {
        match self {
            #[cfg(feature = "snowflake")]
            Self::Snowflake(_) => Strategy::Snowflake,
            #[cfg(feature = "uuid")]
            Self::Uuid(_) => Strategy::Uuid,
            #[cfg(feature = "segment")]
            Self::Segment(_) => Strategy::Segment,
        }
    }

    #[cfg_attr(docsrs, doc(cfg(feature = "segment")))]
    #[cfg(feature = "segment")]
    pub const fn as_segment(&self) -> Option<&SegmentIdGenerator> {
        match self {
            Self::Segment(generator) => Some(generator),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    fn as_dyn(&self) -> &dyn IdGenerator {
        match self {
            #[cfg(feature = "snowflake")]
            Self::Snowflake(generator) => generator,
            #[cfg(feature = "uuid")]
            Self::Uuid(generator) => generator,
            #[cfg(feature = "segment")]
            Self::Segment(generator) => generator,
        }
    }
}

impl IdGenerator for ConfiguredGenerator {
    fn generate_long_id(&self) -> Result<i64> {
        self.as_dyn().generate_long_id()
    }

    fn generate_string_id(&self) -> Result<String> {
        self.as_dyn().generate_string_id()
    }

    fn generate_prefixed_id(&self, prefix: &str) -> Result<String> {
        self.as_dyn().generate_prefixed_id(prefix)
    }
}

/// Validates `config` and builds the generator for its default strategy.
///
/// # Errors
///
/// - [`Error::InvalidConfiguration`] if `config` is disabled or invalid, the
///   strategy was not compiled in, or the segment strategy has no provider.
/// - Any error of the chosen generator's constructor.
///
/// # Example
/// ```
/// use segflake::{Collaborators, DistributedIdConfig, IdGenerator, Strategy, build_generator};
///
/// let config = DistributedIdConfig {
///     default_strategy: Strategy::Uuid,
///     ..DistributedIdConfig::default()
/// };
/// let generator = build_generator(&config, Collaborators::default())?;
/// assert_eq!(generator.generate_string_id()?.len(), 32);
/// # Ok::<(), segflake::Error>(())
/// ```
pub fn build_generator(
    config: &DistributedIdConfig,
    collaborators: Collaborators,
) -> Result<ConfiguredGenerator> {
    if !config.enabled {
        return Err(Error::invalid_configuration(
            "distributed id generation is disabled",
        ));
    }
    config.validate()?;

    #[cfg(feature = "tracing")]
    tracing::info!(strategy = %config.default_strategy, "building id generator");

    match config.default_strategy {
        #[cfg(feature = "snowflake")]
        Strategy::Snowflake => {
            let epoch = Duration::from_millis(config.snowflake.epoch_millis);
            let generator = match &collaborators.assigner {
                Some(assigner) => SnowflakeIdGenerator::with_epoch(assigner, SystemClock, epoch)?,
                None => SnowflakeIdGenerator::with_epoch(
                    &StaticWorkerIdAssigner::new(
                        config.snowflake.datacenter_id,
                        config.snowflake.worker_id,
                    ),
                    SystemClock,
                    epoch,
                )?,
            };
            Ok(ConfiguredGenerator::Snowflake(generator))
        }
        #[cfg(feature = "uuid")]
        Strategy::Uuid => Ok(ConfiguredGenerator::Uuid(UuidGenerator::new())),
        #[cfg(feature = "segment")]
        Strategy::Segment => {
            let provider = collaborators.provider.ok_or_else(|| {
                Error::invalid_configuration("segment strategy requires a segment provider")
            })?;
            SegmentIdGenerator::new(provider, &config.segment, SystemClock)
                .map(ConfiguredGenerator::Segment)
        }
        #[allow(unreachable_patterns)]
        other => Err(Error::invalid_configuration(format!(
            "id strategy `{other}` is not compiled in"
        ))),
    }
}
