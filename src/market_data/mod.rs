//! Market data service: the two cache instantiations over the upstream
//! gateway, with write-through to the persistence collaborator.
//!
//! The markets collection lives in a single-slot cache (TTL minutes); price
//! snapshots live in a per-token cache (TTL seconds). Each instance owns its
//! own locks. The fetch closures bundle the upstream call, the best-effort
//! write-through, and the history read-back; the cache treats the whole
//! closure as one fetch.

pub mod client;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::cache::{CacheLookup, TtlCache};
use crate::clock::Clock;

pub use client::{Market, MarketDataError, MarketsGateway, PolymarketClient, PricePoint};
pub use store::{MarketStore, MemoryMarketStore, PriceSample};

/// Cached value of the markets cache.
#[derive(Debug, Clone, Serialize)]
pub struct MarketsSnapshot {
    pub markets: Vec<Market>,
    pub count: usize,
}

/// Cached value of the price cache: current price plus the derived
/// 24-hour history series.
#[derive(Debug, Clone, Serialize)]
pub struct PriceSnapshot {
    pub token_id: String,
    pub current_price: f64,
    pub volume: f64,
    pub price_history_24h: Vec<PriceSample>,
}

pub struct MarketDataService {
    gateway: Arc<dyn MarketsGateway>,
    store: Arc<dyn MarketStore>,
    markets_cache: TtlCache<(), MarketsSnapshot>,
    price_cache: TtlCache<String, PriceSnapshot>,
}

impl MarketDataService {
    pub fn new(
        gateway: Arc<dyn MarketsGateway>,
        store: Arc<dyn MarketStore>,
        clock: Arc<dyn Clock>,
        markets_ttl: Duration,
        price_ttl: Duration,
    ) -> Self {
        Self {
            gateway,
            store,
            markets_cache: TtlCache::new(clock.clone(), markets_ttl),
            price_cache: TtlCache::new(clock, price_ttl),
        }
    }

    /// The full market collection, cached behind the single-slot TTL cache.
    pub async fn markets(
        &self,
        active_only: bool,
        force_refresh: bool,
    ) -> Result<CacheLookup<MarketsSnapshot>, MarketDataError> {
        self.markets_cache
            .get_or_fetch_single(force_refresh, || async {
                let markets = self.gateway.fetch_markets(active_only).await?;
                if !markets.is_empty() {
                    if let Err(err) = self.store.upsert_markets(&markets).await {
                        warn!(error = %err, "failed to persist markets, continuing");
                    }
                }
                Ok(MarketsSnapshot {
                    count: markets.len(),
                    markets,
                })
            })
            .await
    }

    /// Current price + 24h history for one token, cached per key.
    pub async fn price(
        &self,
        token_id: &str,
        force_refresh: bool,
    ) -> Result<CacheLookup<PriceSnapshot>, MarketDataError> {
        let token = token_id.to_string();
        self.price_cache
            .get_or_fetch(token.clone(), force_refresh, || async {
                let point = self.gateway.fetch_price(&token).await?;
                if let Err(err) = self.store.record_price(&point).await {
                    warn!(token = %token, error = %err, "failed to persist price point, continuing");
                }
                let history = self
                    .store
                    .history_24h(&token)
                    .await
                    .map_err(|e| MarketDataError::Store(e.to_string()))?;
                Ok(PriceSnapshot {
                    token_id: token.clone(),
                    current_price: point.price,
                    volume: point.volume,
                    price_history_24h: history,
                })
            })
            .await
    }
}
