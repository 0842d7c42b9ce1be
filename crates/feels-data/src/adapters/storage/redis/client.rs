//! Redis client implementation

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::config::RedisConfig;
use crate::core::{CachePort, DataError, DataResult, StorageError};

/// Redis-backed [`CachePort`]
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    response_timeout: Duration,
}

impl RedisCache {
    /// Connect to Redis
    pub async fn connect(config: &RedisConfig) -> DataResult<Self> {
        let client = Client::open(config.url.as_str())?;

        let manager = timeout(
            Duration::from_secs(config.connection_timeout_secs),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| cache_error(format!("connecting to {} timed out", config.url)))??;

        debug!("Redis client connected successfully");

        Ok(Self {
            manager,
            response_timeout: Duration::from_secs(config.response_timeout_secs),
        })
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> DataResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match timeout(self.response_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(cache_error(format!("{} timed out", op))),
        }
    }
}

fn cache_error(reason: String) -> DataError {
    DataError::Storage(StorageError::Cache(reason))
}

#[async_trait]
impl CachePort for RedisCache {
    async fn get(&self, key: &str) -> DataResult<Option<String>> {
        let mut conn = self.manager.clone();
        self.bounded("GET", conn.get(key)).await
    }

    async fn bulk_get(&self, keys: &[String]) -> DataResult<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.manager.clone();
        let values: Vec<Option<String>> = self
            .bounded("MGET", redis::cmd("MGET").arg(keys).query_async(&mut conn))
            .await?;

        debug!("MGET {} keys", keys.len());
        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
            .collect())
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> DataResult<()> {
        let mut conn = self.manager.clone();
        let ttl_secs = ttl.as_secs().max(1);

        self.bounded("SET", conn.set_ex::<_, _, ()>(key, value, ttl_secs))
            .await?;

        debug!("Cached key: {} with TTL: {}s", key, ttl_secs);

        Ok(())
    }

    async fn health_check(&self) -> DataResult<()> {
        let mut conn = self.manager.clone();

        let pong: String = self
            .bounded("PING", redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|e| {
                error!("Redis health check failed: {}", e);
                e
            })?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(cache_error("Unexpected PING response".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CacheExt;

    #[tokio::test]
    #[ignore] // Requires running Redis
    async fn test_redis_roundtrip() {
        let cache = RedisCache::connect(&RedisConfig::default()).await.unwrap();

        cache
            .set_json("feels-data:test", &vec![1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();
        let retrieved: Option<Vec<i32>> = cache.get_json("feels-data:test").await.unwrap();
        assert_eq!(retrieved, Some(vec![1, 2, 3]));

        let many = cache
            .bulk_get(&["feels-data:test".to_string(), "feels-data:absent".to_string()])
            .await
            .unwrap();
        assert_eq!(many.len(), 1);
    }
}
