pub mod pool;
pub mod retry;

pub use pool::{PoolConfig, WarmupPool};
pub use retry::{RetryPolicy, RetryState, XorShift64};
