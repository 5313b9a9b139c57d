//! Exchange store backends.

mod file;
mod inmemory;
#[cfg(feature = "redis-backend")]
mod redis;

pub use file::FileExchangeStore;
pub use inmemory::InMemoryExchangeStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisExchangeStore;
