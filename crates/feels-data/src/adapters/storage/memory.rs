//! In-process cache with passive TTL expiry
//!
//! Stands in for Redis in tests and single-node deployments. Expired entries
//! are skipped on read and replaced on write; nothing sweeps them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::{CachePort, DataResult};

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CachePort for MemoryCache {
    async fn get(&self, key: &str) -> DataResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn bulk_get(&self, keys: &[String]) -> DataResult<HashMap<String, String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| {
                entries
                    .get(key)
                    .filter(|(_, expires)| *expires > now)
                    .map(|(value, _)| (key.clone(), value.clone()))
            })
            .collect())
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> DataResult<()> {
        let expires = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn health_check(&self) -> DataResult<()> {
        Ok(())
    }
}
