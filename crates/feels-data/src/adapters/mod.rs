//! Adapters layer - Infrastructure implementations
//!
//! This layer contains the infrastructure adapters that implement the port
//! traits defined in the core layer, connecting the translator and loaders
//! to PostgreSQL and Redis.

pub mod storage;

// Re-export commonly used adapters
pub use storage::{MemoryCache, PostgresStore, RedisCache};
