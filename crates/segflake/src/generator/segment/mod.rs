mod buffer;
mod generator;
mod id_segment;
mod pool;

pub use buffer::*;
pub use generator::*;
pub use id_segment::*;
pub use pool::*;
