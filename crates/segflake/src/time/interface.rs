use core::time::Duration;
use std::sync::Arc;

/// Default Snowflake epoch: Monday, January 1, 2024 00:00:00 UTC+8
/// (2023-12-31T16:00:00Z).
pub const DEFAULT_EPOCH: Duration = Duration::from_millis(1_704_038_400_000);

/// A source of wall-clock time in milliseconds since the UNIX epoch.
///
/// Generators never cache the value: every id request reads the clock, which
/// is what lets [`SnowflakeIdGenerator`] notice a clock rollback. Tests plug
/// in mocked clocks.
///
/// # Example
///
/// ```
/// use segflake::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1234);
/// ```
///
/// [`SnowflakeIdGenerator`]: crate::SnowflakeIdGenerator
pub trait TimeSource {
    /// Returns the current time in milliseconds since 1970-01-01 UTC.
    fn current_millis(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}
