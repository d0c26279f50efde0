mod manager;

pub use manager::{connect, create_pool, PoolStats};
