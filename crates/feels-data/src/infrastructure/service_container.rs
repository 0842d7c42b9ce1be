//! Service container for dependency injection

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapter::Repository;
use crate::adapters::storage::{PostgresStore, RedisCache};
use crate::config::DataConfig;
use crate::core::{CachePort, DataError, DataResult, StorePort};
use crate::loader::CachedLoader;
use crate::pricing::{price_loader, PriceLoaderSettings};
use crate::schema::Schema;

/// Shared handles and configuration; request-scoped loaders are built from it
pub struct ServiceContainer {
    /// Configuration
    pub config: DataConfig,

    /// Pooled relational store
    pub store: Arc<dyn StorePort>,

    /// Distributed cache, absent when disabled or unreachable at startup
    pub cache: Option<Arc<dyn CachePort>>,

    /// Entity adapters over `store`
    pub repository: Repository,
}

impl ServiceContainer {
    /// Connect to PostgreSQL and, if enabled, Redis
    pub async fn new(config: DataConfig) -> DataResult<Self> {
        info!("Initializing service container");

        let store: Arc<dyn StorePort> = Arc::new(PostgresStore::connect(&config.database).await?);

        // The cache is an optimization; run degraded without it
        let cache: Option<Arc<dyn CachePort>> = if config.redis.enabled {
            match RedisCache::connect(&config.redis).await {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    warn!("Redis unavailable, continuing without distributed cache: {}", e);
                    None
                }
            }
        } else {
            None
        };

        info!("Storage backends initialized");

        Ok(Self::from_parts(config, store, cache))
    }

    /// Assemble from already-constructed ports
    pub fn from_parts(
        config: DataConfig,
        store: Arc<dyn StorePort>,
        cache: Option<Arc<dyn CachePort>>,
    ) -> Self {
        let schema = Schema::dex().with_matching(&config.matching);
        let repository = Repository::new(store.clone(), schema, &config.naming)
            .with_resolution_mode(config.relations.mode);

        Self {
            config,
            store,
            cache,
            repository,
        }
    }

    pub fn price_settings(&self) -> DataResult<PriceLoaderSettings> {
        if self.config.pricing.quote_token_id.is_empty() {
            return Err(DataError::Configuration(
                "pricing.quote_token_id must be set to derive prices".to_string(),
            ));
        }

        Ok(PriceLoaderSettings {
            source: self.config.loader.price_source.clone(),
            key_prefix: self.config.loader.key_prefix.clone(),
            ttl: self.config.loader.cache_ttl(),
            write_back: self.config.loader.write_back,
            quote_token: self.config.pricing.quote_token_id.clone(),
            quote_price: self.config.pricing.quote_price_usd,
        })
    }

    /// A fresh price loader. Build one per request and drop it afterwards;
    /// its memo must not outlive the request.
    pub fn price_loader(&self) -> DataResult<CachedLoader<Decimal>> {
        let settings = self.price_settings()?;
        Ok(price_loader(&self.repository, self.cache.clone(), &settings))
    }

    /// Perform health check on all services
    pub async fn health_check(&self) -> DataResult<()> {
        info!("Performing health check");

        self.store.health_check().await?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.health_check().await {
                warn!("Cache unhealthy, lookups will fall through to the store: {}", e);
            }
        }

        info!("All services healthy");
        Ok(())
    }
}
