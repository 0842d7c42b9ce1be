//! Token prices derived from pool reserves

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::adapter::Repository;
use crate::core::{CachePort, DataError, DataResult, ValueComputer};
use crate::loader::{CachedLoader, LatestValueSource, TieredResolver, WriteBack};
use crate::query::{where_map, OrderBy, QueryDescriptor};

/// Prices a token off its deepest pair against a quote token.
///
/// `price = quote_reserve / token_reserve * quote_price`
pub struct ReservePriceComputer {
    repo: Repository,
    quote_token: String,
    quote_price: Decimal,
}

impl ReservePriceComputer {
    pub fn new(repo: Repository, quote_token: impl Into<String>, quote_price: Decimal) -> Self {
        Self {
            repo,
            quote_token: quote_token.into(),
            quote_price,
        }
    }

    fn failure(key: &str, reason: impl Into<String>) -> DataError {
        DataError::Computation {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ValueComputer<Decimal> for ReservePriceComputer {
    async fn compute(&self, token_id: &str) -> DataResult<Decimal> {
        if token_id.eq_ignore_ascii_case(&self.quote_token) {
            return Ok(self.quote_price);
        }

        let quote = self.quote_token.as_str();
        let descriptor = QueryDescriptor::new()
            .any_of(vec![
                where_map([("token0Id", json!(token_id)), ("token1Id", json!(quote))]),
                where_map([("token0Id", json!(quote)), ("token1Id", json!(token_id))]),
            ])
            .order_by(OrderBy::desc("reserveUSD"));

        let pair = self
            .repo
            .pairs()
            .find_first(&descriptor)
            .await?
            .ok_or_else(|| Self::failure(token_id, format!("no pair against {}", quote)))?;

        let (token_side, quote_side) = if pair.text("token0Id") == Some(token_id) {
            ("reserve0", "reserve1")
        } else {
            ("reserve1", "reserve0")
        };
        let token_reserve = pair
            .decimal(token_side)
            .ok_or_else(|| Self::failure(token_id, format!("pair has no {}", token_side)))?;
        let quote_reserve = pair
            .decimal(quote_side)
            .ok_or_else(|| Self::failure(token_id, format!("pair has no {}", quote_side)))?;

        if token_reserve.is_zero() {
            return Err(Self::failure(token_id, "empty token reserve"));
        }

        let price = (quote_reserve / token_reserve * self.quote_price).normalize();
        debug!("Derived price for {} from reserves: {}", token_id, price);
        Ok(price)
    }
}

/// Settings for a per-request price loader
#[derive(Clone)]
pub struct PriceLoaderSettings {
    pub source: LatestValueSource,
    pub key_prefix: String,
    pub ttl: Duration,
    pub write_back: WriteBack,
    pub quote_token: String,
    pub quote_price: Decimal,
}

/// Build a fresh price loader: cache, latest stored price, reserve-derived
/// price, then zero
pub fn price_loader(
    repo: &Repository,
    cache: Option<Arc<dyn CachePort>>,
    settings: &PriceLoaderSettings,
) -> CachedLoader<Decimal> {
    let computer = ReservePriceComputer::new(
        repo.clone(),
        settings.quote_token.clone(),
        settings.quote_price,
    );

    let mut resolver = TieredResolver::new(repo.store().clone(), settings.source.clone(), Decimal::ZERO)
        .with_computer(Arc::new(computer))
        .with_key_prefix(settings.key_prefix.clone())
        .with_ttl(settings.ttl)
        .with_write_back(settings.write_back);
    if let Some(cache) = cache {
        resolver = resolver.with_cache(cache);
    }
    resolver.into_loader()
}
