//! Core trait abstractions (Ports in Hexagonal Architecture)

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use super::error::{DataError, DataResult};
use super::types::{Row, Statement};

/// Store port - the single "execute parameterized statement, return rows" primitive.
///
/// Returned rows are keyed by column name. Implementations bind `params`
/// positionally (`$1`, `$2`, ...) and must support `NULLS LAST` ordering and
/// `lower(..)` / `ILIKE` comparisons.
#[async_trait]
pub trait StorePort: Send + Sync {
    async fn execute(&self, statement: &Statement) -> DataResult<Vec<Row>>;

    /// Health check
    async fn health_check(&self) -> DataResult<()>;
}

/// Cache port - raw string values with TTL semantics.
///
/// Values are JSON documents; see [`CacheExt`] for typed access.
#[async_trait]
pub trait CachePort: Send + Sync {
    /// Get a value from cache
    async fn get(&self, key: &str) -> DataResult<Option<String>>;

    /// Get many values in one round trip; absent keys are missing from the map
    async fn bulk_get(&self, keys: &[String]) -> DataResult<HashMap<String, String>>;

    /// Set a value in cache with TTL
    async fn set(&self, key: &str, value: String, ttl: Duration) -> DataResult<()>;

    /// Check if cache is healthy
    async fn health_check(&self) -> DataResult<()>;
}

/// Typed JSON helpers over any [`CachePort`]
#[async_trait]
pub trait CacheExt: CachePort {
    async fn get_json<T>(&self, key: &str) -> DataResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> DataResult<()>
    where
        T: Serialize + Send + Sync,
    {
        let json = serde_json::to_string(value)?;
        self.set(key, json, ttl).await
    }
}

impl<C: CachePort + ?Sized> CacheExt for C {}

/// Computation callback used when both the store and the cache miss
#[async_trait]
pub trait ValueComputer<V>: Send + Sync {
    async fn compute(&self, key: &str) -> DataResult<V>;
}

/// [`ValueComputer`] built from an async closure
pub struct ComputeFn<F, V> {
    func: F,
    _value: PhantomData<fn() -> V>,
}

/// Wrap an async closure as a [`ValueComputer`]
pub fn compute_fn<F, Fut, V>(func: F) -> ComputeFn<F, V>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = DataResult<V>> + Send,
    V: Send,
{
    ComputeFn {
        func,
        _value: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, V> ValueComputer<V> for ComputeFn<F, V>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = DataResult<V>> + Send,
    V: Send,
{
    async fn compute(&self, key: &str) -> DataResult<V> {
        (self.func)(key.to_string()).await
    }
}

/// Convert a decoded scalar into a loader value
pub trait FromScalar: Sized {
    fn from_scalar(scalar: &super::types::Scalar) -> DataResult<Self>;
}

impl FromScalar for rust_decimal::Decimal {
    fn from_scalar(scalar: &super::types::Scalar) -> DataResult<Self> {
        scalar.as_decimal().ok_or_else(|| DataError::Decode {
            column: "value".to_string(),
            reason: format!("expected a numeric value, got {}", scalar),
        })
    }
}

impl FromScalar for i64 {
    fn from_scalar(scalar: &super::types::Scalar) -> DataResult<Self> {
        scalar.as_i64().ok_or_else(|| DataError::Decode {
            column: "value".to_string(),
            reason: format!("expected an integer, got {}", scalar),
        })
    }
}

impl FromScalar for String {
    fn from_scalar(scalar: &super::types::Scalar) -> DataResult<Self> {
        scalar.key_string().ok_or_else(|| DataError::Decode {
            column: "value".to_string(),
            reason: "unexpected NULL".to_string(),
        })
    }
}
