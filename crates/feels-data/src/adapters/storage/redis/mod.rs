//! Redis cache adapter

mod client;

pub use client::RedisCache;
