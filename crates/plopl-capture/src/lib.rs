// Library exports for the capture binary, benchmarks and tests

// ===== Schema matching =====
pub mod condition;
pub mod matcher;
pub mod path;
pub mod schema;
pub mod validation;

// ===== Exchange correlation =====
pub mod capture;
pub mod delivery;
pub mod scheduler;
pub mod store;

// ===== Ambient =====
pub mod config;
pub mod metrics;

// Don't export internal modules
mod backends;

pub use backends::{FileExchangeStore, InMemoryExchangeStore};
#[cfg(feature = "redis-backend")]
pub use backends::RedisExchangeStore;
