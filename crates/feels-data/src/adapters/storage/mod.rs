//! Storage adapters
//!
//! Implementations of the store and cache ports: PostgreSQL for rows, Redis
//! for the distributed cache, and an in-process cache for tests and
//! single-node setups.

pub mod memory;
pub mod postgres;
pub mod redis;

pub use memory::MemoryCache;
pub use postgres::PostgresStore;
pub use redis::RedisCache;
