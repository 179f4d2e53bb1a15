//! Persistence collaborator seam. The core only needs upserts, price
//! appends, a 24-hour history read-back, and best-effort sentiment
//! recording; durability is the implementation's business, not ours.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::judgment::ConsensusResult;

use super::client::{Market, PricePoint};

/// One historical price observation, as served back to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn upsert_markets(&self, markets: &[Market]) -> anyhow::Result<()>;
    async fn record_price(&self, point: &PricePoint) -> anyhow::Result<()>;
    /// Samples for the trailing 24 hours, oldest first.
    async fn history_24h(&self, token_id: &str) -> anyhow::Result<Vec<PriceSample>>;
    async fn record_sentiment(&self, market_id: &str, result: &ConsensusResult)
        -> anyhow::Result<()>;
}

/// In-process store. Keeps enough history for the 24-hour read-back and
/// nothing more; entries older than the window are pruned on write.
pub struct MemoryMarketStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    markets: HashMap<String, Market>,
    prices: HashMap<String, Vec<PriceSample>>,
    sentiments: Vec<(String, ConsensusResult)>,
}

impl MemoryMarketStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn market_count(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").markets.len()
    }

    pub fn sentiment_count(&self) -> usize {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .sentiments
            .len()
    }
}

#[async_trait]
impl MarketStore for MemoryMarketStore {
    async fn upsert_markets(&self, markets: &[Market]) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        for market in markets {
            inner
                .markets
                .insert(market.token_id.clone(), market.clone());
        }
        Ok(())
    }

    async fn record_price(&self, point: &PricePoint) -> anyhow::Result<()> {
        let now = self.clock.now();
        let cutoff = now - Duration::hours(24);
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let series = inner.prices.entry(point.token_id.clone()).or_default();
        series.push(PriceSample {
            price: point.price,
            timestamp: now,
        });
        series.retain(|s| s.timestamp >= cutoff);
        Ok(())
    }

    async fn history_24h(&self, token_id: &str) -> anyhow::Result<Vec<PriceSample>> {
        let cutoff = self.clock.now() - Duration::hours(24);
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .prices
            .get(token_id)
            .map(|series| {
                series
                    .iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn record_sentiment(
        &self,
        market_id: &str,
        result: &ConsensusResult,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.sentiments.push((market_id.to_string(), result.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::Value;

    fn point(token: &str, price: f64) -> PricePoint {
        PricePoint {
            token_id: token.to_string(),
            price,
            volume: 0.0,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn history_window_drops_old_samples() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryMarketStore::new(clock.clone());

        store.record_price(&point("tok", 0.5)).await.unwrap();
        clock.advance(Duration::hours(25));
        store.record_price(&point("tok", 0.6)).await.unwrap();

        let history = store.history_24h("tok").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, 0.6);
    }

    #[tokio::test]
    async fn history_for_unknown_token_is_empty() {
        let store = MemoryMarketStore::new(Arc::new(ManualClock::new(Utc::now())));
        assert!(store.history_24h("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_overwrites_by_token_id() {
        let store = MemoryMarketStore::new(Arc::new(ManualClock::new(Utc::now())));
        let mut market = Market {
            token_id: "0x1".into(),
            question: "v1".into(),
            description: String::new(),
            end_date: None,
            outcome_prices: Value::Null,
            volume: 0.0,
            active: true,
        };
        store.upsert_markets(std::slice::from_ref(&market)).await.unwrap();
        market.question = "v2".into();
        store.upsert_markets(std::slice::from_ref(&market)).await.unwrap();
        assert_eq!(store.market_count(), 1);
    }
}
