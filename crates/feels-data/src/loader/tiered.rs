//! Tiered resolution behind the cached loader: distributed cache, one bulk
//! store query, computation callback, default

use async_trait::async_trait;
use futures::future::join_all;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::{
    CacheExt, CachePort, DataResult, FromScalar, Scalar, Statement, StorePort, ValueComputer,
};
use crate::query::{quote_ident, ParamList};

use super::batch::{BatchFn, BatchedLoader};

/// Loader value: a found value or the default standing in for a miss
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum Resolved<V> {
    Found(V),
    NotFound(V),
}

impl<V> Resolved<V> {
    pub fn value(&self) -> &V {
        match self {
            Resolved::Found(v) | Resolved::NotFound(v) => v,
        }
    }

    pub fn into_value(self) -> V {
        match self {
            Resolved::Found(v) | Resolved::NotFound(v) => v,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolved::Found(_))
    }
}

/// Which resolved values are written to the distributed cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteBack {
    /// Another process owns the cache
    Never,
    /// Values produced by the computation callback
    #[default]
    Computed,
}

/// "Most recent record per key" table layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestValueSource {
    pub table: String,
    pub key_column: String,
    pub value_column: String,
    /// Column ordering records of one key, newest first
    pub recency_column: String,
}

impl LatestValueSource {
    pub fn new(table: &str, key_column: &str, value_column: &str, recency_column: &str) -> Self {
        Self {
            table: table.to_string(),
            key_column: key_column.to_string(),
            value_column: value_column.to_string(),
            recency_column: recency_column.to_string(),
        }
    }

    /// One `DISTINCT ON` statement resolving every key at once.
    ///
    /// Result columns are aliased `key` and `value`.
    pub fn statement(&self, keys: &[String]) -> Statement {
        let mut params = ParamList::new();
        let placeholders: Vec<String> = keys
            .iter()
            .map(|k| params.push(Scalar::Text(k.clone())))
            .collect();
        let key = quote_ident(&self.key_column);

        let sql = format!(
            "SELECT DISTINCT ON ({key}) {key} AS \"key\", {value} AS \"value\" FROM {table} \
             WHERE {key} IN ({placeholders}) ORDER BY {key}, {recency} DESC NULLS LAST",
            key = key,
            value = quote_ident(&self.value_column),
            table = quote_ident(&self.table),
            placeholders = placeholders.join(", "),
            recency = quote_ident(&self.recency_column),
        );
        Statement::new(sql, params.into_values())
    }
}

/// [`BatchFn`] resolving keys through cache, store, computation and default.
///
/// Cache and store failures are logged and treated as misses. A failing
/// computation only affects its own key.
pub struct TieredResolver<V> {
    store: Arc<dyn StorePort>,
    source: LatestValueSource,
    cache: Option<Arc<dyn CachePort>>,
    computer: Option<Arc<dyn ValueComputer<V>>>,
    default: V,
    key_prefix: String,
    ttl: Duration,
    write_back: WriteBack,
}

impl<V: Clone> Clone for TieredResolver<V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            source: self.source.clone(),
            cache: self.cache.clone(),
            computer: self.computer.clone(),
            default: self.default.clone(),
            key_prefix: self.key_prefix.clone(),
            ttl: self.ttl,
            write_back: self.write_back,
        }
    }
}

impl<V> TieredResolver<V>
where
    V: Clone + Serialize + DeserializeOwned + FromScalar + Send + Sync + 'static,
{
    pub fn new(store: Arc<dyn StorePort>, source: LatestValueSource, default: V) -> Self {
        Self {
            store,
            source,
            cache: None,
            computer: None,
            default,
            key_prefix: String::new(),
            ttl: Duration::from_secs(60),
            write_back: WriteBack::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CachePort>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_computer(mut self, computer: Arc<dyn ValueComputer<V>>) -> Self {
        self.computer = Some(computer);
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_write_back(mut self, write_back: WriteBack) -> Self {
        self.write_back = write_back;
        self
    }

    /// Wrap in a fresh per-request loader
    pub fn into_loader(self) -> CachedLoader<V> {
        BatchedLoader::new(self)
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn read_cache(&self, keys: &[String]) -> HashMap<String, V> {
        let Some(cache) = &self.cache else {
            return HashMap::new();
        };

        let cache_keys: Vec<String> = keys.iter().map(|k| self.cache_key(k)).collect();
        let raw = match cache.bulk_get(&cache_keys).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cache read failed, treating {} keys as misses: {}", keys.len(), e);
                return HashMap::new();
            }
        };

        keys.iter()
            .zip(&cache_keys)
            .filter_map(|(key, cache_key)| {
                let json = raw.get(cache_key)?;
                match serde_json::from_str(json) {
                    Ok(value) => Some((key.clone(), value)),
                    Err(e) => {
                        warn!("Discarding undecodable cache entry {}: {}", cache_key, e);
                        None
                    }
                }
            })
            .collect()
    }

    async fn read_store(&self, keys: &[String]) -> HashMap<String, V> {
        if keys.is_empty() {
            return HashMap::new();
        }

        let rows = match self.store.execute(&self.source.statement(keys)).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Store lookup failed, treating {} keys as misses: {}", keys.len(), e);
                return HashMap::new();
            }
        };

        let mut found = HashMap::with_capacity(rows.len());
        for row in rows {
            let Some(key) = row.scalar("key").and_then(Scalar::key_string) else {
                continue;
            };
            match row.scalar("value").filter(|v| !v.is_null()) {
                Some(value) => match V::from_scalar(value) {
                    Ok(value) => {
                        found.insert(key, value);
                    }
                    Err(e) => warn!("Ignoring stored value for {}: {}", key, e),
                },
                None => debug!("Stored value for {} is NULL", key),
            }
        }
        found
    }

    async fn compute(&self, keys: &[String]) -> HashMap<String, V> {
        let Some(computer) = &self.computer else {
            return HashMap::new();
        };

        let outcomes = join_all(keys.iter().map(|key| async move {
            (key.clone(), computer.compute(key).await)
        }))
        .await;

        outcomes
            .into_iter()
            .filter_map(|(key, outcome)| match outcome {
                Ok(value) => Some((key, value)),
                Err(e) => {
                    warn!("Computation failed for {}, using default: {}", key, e);
                    None
                }
            })
            .collect()
    }

    async fn write_back(&self, computed: &HashMap<String, V>) {
        let Some(cache) = &self.cache else {
            return;
        };
        if self.write_back == WriteBack::Never {
            return;
        }

        for (key, value) in computed {
            if let Err(e) = cache.set_json(&self.cache_key(key), value, self.ttl).await {
                warn!("Failed to cache computed value for {}: {}", key, e);
            }
        }
    }
}

#[async_trait]
impl<V> BatchFn<String, Resolved<V>> for TieredResolver<V>
where
    V: Clone + Serialize + DeserializeOwned + FromScalar + Send + Sync + 'static,
{
    async fn load(&self, keys: &[String]) -> DataResult<Vec<Resolved<V>>> {
        let mut resolved = self.read_cache(keys).await;
        let cache_hits = resolved.len();

        let misses: Vec<String> = keys
            .iter()
            .filter(|k| !resolved.contains_key(*k))
            .cloned()
            .collect();
        resolved.extend(self.read_store(&misses).await);
        let store_hits = resolved.len() - cache_hits;

        let remaining: Vec<String> = misses
            .into_iter()
            .filter(|k| !resolved.contains_key(k))
            .collect();
        let computed = self.compute(&remaining).await;
        self.write_back(&computed).await;

        debug!(
            "Resolved batch of {}: {} cached, {} stored, {} computed",
            keys.len(),
            cache_hits,
            store_hits,
            computed.len()
        );
        resolved.extend(computed);

        Ok(keys
            .iter()
            .map(|key| match resolved.get(key) {
                Some(value) => Resolved::Found(value.clone()),
                None => Resolved::NotFound(self.default.clone()),
            })
            .collect())
    }
}

/// Per-request loader over a [`TieredResolver`]
pub type CachedLoader<V> = BatchedLoader<String, Resolved<V>, TieredResolver<V>>;
