use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use segflake::{
    DEFAULT_BIZ_KEY, DistributedIdConfig, SegmentConfig, SnowflakeConfig, Strategy,
};

/// Where the segment strategy leases its ranges from.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// An in-process counter.
    Memory,
    /// An in-process table with one `(max_id, step)` row per key.
    MemoryDb,
    /// A Redis counter per key (requires the `redis` feature).
    Redis,
}

/// Command line options of the `segflake` binary.
///
/// Every option can also be set through the environment variable named next
/// to it, or in a `.env` file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "segflake",
    version,
    about = "Print distributed 64-bit identifiers, one per line"
)]
pub struct CliArgs {
    /// Id strategy: snowflake, uuid or segment.
    ///
    /// Environment variable: `SEGFLAKE_STRATEGY`
    #[arg(long, env = "SEGFLAKE_STRATEGY", default_value_t = Strategy::Snowflake)]
    pub strategy: Strategy,

    /// Snowflake datacenter id, 0 to 31.
    ///
    /// Environment variable: `SEGFLAKE_DATACENTER_ID`
    #[arg(long, env = "SEGFLAKE_DATACENTER_ID", default_value_t = 0, allow_negative_numbers = true)]
    pub datacenter_id: i64,

    /// Snowflake worker id, 0 to 31.
    ///
    /// Environment variable: `SEGFLAKE_WORKER_ID`
    #[arg(long, env = "SEGFLAKE_WORKER_ID", default_value_t = 0, allow_negative_numbers = true)]
    pub worker_id: i64,

    /// How many ids to print.
    ///
    /// Environment variable: `SEGFLAKE_COUNT`
    #[arg(short = 'n', long, env = "SEGFLAKE_COUNT", default_value_t = 1)]
    pub count: usize,

    /// Business key to draw segment ids from. Defaults to the first of
    /// `--biz-keys`.
    ///
    /// Environment variable: `SEGFLAKE_BIZ_KEY`
    #[arg(long, env = "SEGFLAKE_BIZ_KEY")]
    pub biz_key: Option<String>,

    /// Comma separated business keys that get a segment buffer.
    ///
    /// Environment variable: `SEGFLAKE_BIZ_KEYS`
    #[arg(
        long,
        env = "SEGFLAKE_BIZ_KEYS",
        value_delimiter = ',',
        default_value = DEFAULT_BIZ_KEY
    )]
    pub biz_keys: Vec<String>,

    /// Ids leased per segment.
    ///
    /// Environment variable: `SEGFLAKE_STEP`
    #[arg(long, env = "SEGFLAKE_STEP", default_value_t = 1000, allow_negative_numbers = true)]
    pub step: i64,

    /// String prepended to every id.
    ///
    /// Environment variable: `SEGFLAKE_PREFIX`
    #[arg(long, env = "SEGFLAKE_PREFIX")]
    pub prefix: Option<String>,

    /// Segment provider.
    ///
    /// Environment variable: `SEGFLAKE_PROVIDER`
    #[arg(long, env = "SEGFLAKE_PROVIDER", value_enum, default_value_t = ProviderKind::Memory)]
    pub provider: ProviderKind,

    /// Redis server for `--provider redis`.
    ///
    /// Environment variable: `SEGFLAKE_REDIS_URL`
    #[arg(long, env = "SEGFLAKE_REDIS_URL", default_value = "redis://127.0.0.1/")]
    pub redis_url: String,
}

/// Validated settings of one run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub id: DistributedIdConfig,
    pub count: usize,
    pub prefix: Option<String>,
    pub provider: ProviderKind,
    pub redis_url: String,
}

impl AppConfig {
    /// The business key ids are drawn from.
    pub fn biz_key(&self) -> &str {
        &self.id.segment.default_biz_key
    }
}

impl TryFrom<CliArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.count == 0 {
            bail!("--count must be greater than 0");
        }

        if args.prefix.as_deref().is_some_and(|p| p.trim().is_empty()) {
            bail!("--prefix must not be blank");
        }

        if args.provider == ProviderKind::Redis && !cfg!(feature = "redis") {
            bail!("--provider redis requires segflake-cli to be built with the `redis` feature");
        }

        let biz_keys: Vec<String> = args
            .biz_keys
            .into_iter()
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty())
            .collect();
        let default_biz_key = match args.biz_key {
            Some(key) => key,
            None => biz_keys
                .first()
                .cloned()
                .unwrap_or_else(|| DEFAULT_BIZ_KEY.to_owned()),
        };

        let id = DistributedIdConfig {
            enabled: true,
            default_strategy: args.strategy,
            snowflake: SnowflakeConfig {
                datacenter_id: args.datacenter_id,
                worker_id: args.worker_id,
                ..SnowflakeConfig::default()
            },
            segment: SegmentConfig {
                biz_keys,
                default_biz_key,
                step: args.step,
                ..SegmentConfig::default()
            },
        };
        id.validate().context("invalid id configuration")?;

        Ok(Self {
            id,
            count: args.count,
            prefix: args.prefix,
            provider: args.provider,
            redis_url: args.redis_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<AppConfig> {
        let args = CliArgs::try_parse_from(std::iter::once("segflake").chain(args.iter().copied()))?;
        AppConfig::try_from(args)
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.id.default_strategy, Strategy::Snowflake);
        assert_eq!(config.count, 1);
        assert_eq!(config.biz_key(), "default");
        assert_eq!(config.provider, ProviderKind::Memory);
    }

    #[test]
    fn segment_keys() {
        let config = parse(&[
            "--strategy",
            "Segment",
            "--biz-keys",
            "order, user",
            "--biz-key",
            "user",
            "--step",
            "50",
            "--provider",
            "memory-db",
        ])
        .unwrap();
        assert_eq!(config.id.default_strategy, Strategy::Segment);
        assert_eq!(config.id.segment.biz_keys, ["order", "user"]);
        assert_eq!(config.biz_key(), "user");
        assert_eq!(config.id.segment.step, 50);
        assert_eq!(config.provider, ProviderKind::MemoryDb);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["--count", "0"]).is_err());
        assert!(parse(&["--prefix", " "]).is_err());
        assert!(parse(&["--worker-id", "32"]).is_err());
        assert!(parse(&["--strategy", "leaf"]).is_err());
        assert!(parse(&["--strategy", "segment", "--biz-key", "missing"]).is_err());
        assert!(parse(&["--strategy", "segment", "--step", "-5"]).is_err());
    }
}
