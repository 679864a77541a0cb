mod interface;
#[cfg(feature = "segment")]
mod segment;
#[cfg(feature = "snowflake")]
mod snowflake;
#[cfg(feature = "uuid")]
mod uuid;

pub use interface::*;
#[cfg_attr(docsrs, doc(cfg(feature = "segment")))]
#[cfg(feature = "segment")]
pub use segment::*;
#[cfg_attr(docsrs, doc(cfg(feature = "snowflake")))]
#[cfg(feature = "snowflake")]
pub use snowflake::*;
#[cfg_attr(docsrs, doc(cfg(feature = "uuid")))]
#[cfg(feature = "uuid")]
pub use self::uuid::*;
