pub mod pool;
pub mod replacer;

pub use pool::{BufferPool, FetchGuard};
