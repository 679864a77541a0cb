//! Distributed, coordination-free identifier generation.
//!
//! Two strategies do the real work:
//!
//! - [`SnowflakeIdGenerator`] packs wall-clock time, a datacenter id, a worker
//!   id and a per-millisecond sequence into a single `i64`.
//! - [`SegmentIdGenerator`] leases contiguous ranges of integers from a shared
//!   counter (a database row or a Redis key) and serves them from an
//!   in-process double buffer that is refilled in the background.
//!
//! Both, together with the trivial [`UuidGenerator`], implement the
//! [`IdGenerator`] façade. [`build_generator`] assembles the configured one.
mod config;
mod error;
mod factory;
mod generator;
#[cfg(feature = "snowflake")]
mod id;
#[cfg(feature = "segment")]
mod provider;
mod time;
mod worker;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::factory::*;
pub use crate::generator::*;
#[cfg(feature = "snowflake")]
pub use crate::id::*;
#[cfg(feature = "segment")]
pub use crate::provider::*;
pub use crate::time::*;
pub use crate::worker::*;
