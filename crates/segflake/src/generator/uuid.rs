use uuid::Uuid;

use crate::{IdGenerator, Result, generator::interface::ensure_prefix};

/// Random, unordered ids from version 4 UUIDs.
///
/// The long id is the most significant 64 bits of a fresh UUID with the sign
/// bit cleared, so it is never negative but may collide far more readily than
/// the full UUID. String ids are the full UUID as 32 lowercase hex digits
/// without dashes.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidGenerator;

impl UuidGenerator {
    pub const fn new() -> Self {
        Self
    }
}

impl IdGenerator for UuidGenerator {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn generate_long_id(&self) -> Result<i64> {
        let high = (Uuid::new_v4().as_u128() >> 64) as u64;
        Ok((high & i64::MAX as u64) as i64)
    }

    fn generate_string_id(&self) -> Result<String> {
        Ok(Uuid::new_v4().simple().to_string())
    }

    fn generate_prefixed_id(&self, prefix: &str) -> Result<String> {
        ensure_prefix(prefix)?;
        Ok(format!("{prefix}{}", Uuid::new_v4().simple()))
    }
}
