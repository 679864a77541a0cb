//! # `segflake`
//!
//! Prints identifiers from any of the library's strategies.
//!
//! ## Usage
//!
//! ```bash
//! segflake --count 5
//! segflake --strategy segment --biz-keys order,user --biz-key order --step 100 -n 250
//! SEGFLAKE_STRATEGY=uuid segflake --prefix usr_
//! ```

mod config;
mod telemetry;

use std::{
    io::{BufWriter, Write},
    sync::Arc,
};

use clap::Parser;
use segflake::{
    Collaborators, ConfiguredGenerator, CounterSegmentProvider, DbSegmentProvider, IdGenerator,
    MemoryCounterStore, MemorySegmentTable, SegmentProvider, SegmentRow, Strategy, build_generator,
};

use crate::{
    config::{AppConfig, CliArgs, ProviderKind},
    telemetry::init_tracing,
};

fn main() -> anyhow::Result<()> {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    let config = AppConfig::try_from(args)?;

    init_tracing();
    log_startup_info(&config);

    let generator = build_generator(&config.id, collaborators(&config)?)?;

    let mut out = BufWriter::new(std::io::stdout().lock());
    for _ in 0..config.count {
        let id = next_id(&generator, &config)?;
        writeln!(out, "{id}")?;
    }
    out.flush()?;
    Ok(())
}

fn log_startup_info(config: &AppConfig) {
    if cfg!(debug_assertions) {
        tracing::debug!("Starting with full config: {config:#?}");
    } else {
        tracing::info!(
            strategy = %config.id.default_strategy,
            count = config.count,
            "Starting"
        );
    }
}

fn collaborators(config: &AppConfig) -> anyhow::Result<Collaborators> {
    if config.id.default_strategy != Strategy::Segment {
        return Ok(Collaborators::default());
    }

    let segment = &config.id.segment;
    let provider: Arc<dyn SegmentProvider> = match config.provider {
        ProviderKind::Memory => Arc::new(CounterSegmentProvider::new(
            MemoryCounterStore::new(),
            segment.step,
        )?),
        ProviderKind::MemoryDb => {
            let table = MemorySegmentTable::new();
            for biz_key in &segment.biz_keys {
                table.insert(
                    biz_key.as_str(),
                    SegmentRow {
                        max_id: 0,
                        step: segment.step,
                    },
                );
            }
            Arc::new(DbSegmentProvider::new(table))
        }
        ProviderKind::Redis => redis_provider(config)?,
    };

    Ok(Collaborators::default().with_provider(provider))
}

#[cfg(feature = "redis")]
fn redis_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn SegmentProvider>> {
    use anyhow::Context;

    let store = segflake::RedisCounterStore::open(&config.redis_url)
        .with_context(|| format!("invalid redis url `{}`", config.redis_url))?;
    Ok(Arc::new(CounterSegmentProvider::new(
        store,
        config.id.segment.step,
    )?))
}

#[cfg(not(feature = "redis"))]
fn redis_provider(_config: &AppConfig) -> anyhow::Result<Arc<dyn SegmentProvider>> {
    anyhow::bail!("built without the `redis` feature")
}

/// Segment ids honour `--biz-key`; every strategy honours `--prefix`.
fn next_id(generator: &ConfiguredGenerator, config: &AppConfig) -> anyhow::Result<String> {
    let id = match (generator.as_segment(), &config.prefix) {
        (Some(segment), prefix) => {
            let id = segment.generate_string_id_for(config.biz_key())?;
            match prefix {
                Some(prefix) => format!("{prefix}{id}"),
                None => id,
            }
        }
        (None, Some(prefix)) => generator.generate_prefixed_id(prefix)?,
        (None, None) => generator.generate_string_id()?,
    };
    Ok(id)
}
