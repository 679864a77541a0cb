use crate::{Error, Result};

/// The uniform contract shared by every id strategy.
///
/// Implementations are shared between threads, so every method takes
/// `&self`.
pub trait IdGenerator: Send + Sync {
    /// Generates a 64-bit id.
    ///
    /// # Errors
    ///
    /// Strategy specific, e.g. [`Error::ClockMovedBackwards`] for Snowflake
    /// or `Error::SegmentAllocationFailed` for segments.
    fn generate_long_id(&self) -> Result<i64>;

    /// Generates a string id. Numeric strategies render the long id in
    /// decimal.
    ///
    /// # Errors
    ///
    /// Same as [`IdGenerator::generate_long_id`].
    fn generate_string_id(&self) -> Result<String> {
        self.generate_long_id().map(|id| id.to_string())
    }

    /// Generates a string id with `prefix` prepended verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `prefix` is empty or only
    /// whitespace, otherwise the same errors as
    /// [`IdGenerator::generate_string_id`].
    fn generate_prefixed_id(&self, prefix: &str) -> Result<String> {
        ensure_prefix(prefix)?;
        let id = self.generate_string_id()?;
        Ok(format!("{prefix}{id}"))
    }
}

impl<G: IdGenerator + ?Sized> IdGenerator for Box<G> {
    fn generate_long_id(&self) -> Result<i64> {
        (**self).generate_long_id()
    }

    fn generate_string_id(&self) -> Result<String> {
        (**self).generate_string_id()
    }

    fn generate_prefixed_id(&self, prefix: &str) -> Result<String> {
        (**self).generate_prefixed_id(prefix)
    }
}

pub(crate) fn ensure_prefix(prefix: &str) -> Result<()> {
    if prefix.trim().is_empty() {
        return Err(Error::invalid_argument("id prefix must not be blank"));
    }
    Ok(())
}
