//! Wires providers, aggregator, caches, and collaborators together once at
//! process start. No module-level singletons: everything downstream receives
//! its dependencies explicitly.

use std::sync::Arc;

use tracing::info;

use crate::aggregator::SentimentAggregator;
use crate::api::AppState;
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::market_data::{MarketDataService, MemoryMarketStore, PolymarketClient};
use crate::sources::{AzureOpenAiSource, GeminiSource, PerplexitySource};

pub fn build_state(config: &AppConfig) -> AppState {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let perplexity = Arc::new(PerplexitySource::new(config.perplexity_api_key.clone()));
    let azure = Arc::new(AzureOpenAiSource::new(
        config.azure_endpoint.clone(),
        config.azure_deployment.clone(),
        config.azure_api_key.clone(),
    ));
    let gemini = Arc::new(GeminiSource::new(config.gemini_api_key.clone()));

    // The news-grounded provider doubles as the news-context researcher.
    let aggregator = Arc::new(SentimentAggregator::new(
        perplexity.clone(),
        azure,
        gemini,
        perplexity,
        config.cascade,
    ));

    let availability = aggregator.availability();
    info!(
        news_grounded = availability.news_grounded,
        deep_reasoning = availability.deep_reasoning,
        fallback = availability.fallback,
        "sentiment sources configured"
    );

    let store = Arc::new(MemoryMarketStore::new(clock.clone()));
    let market_data = Arc::new(MarketDataService::new(
        Arc::new(PolymarketClient::new(config.polymarket_host.clone())),
        store.clone(),
        clock.clone(),
        config.markets_ttl,
        config.price_ttl,
    ));

    AppState {
        aggregator,
        market_data,
        store,
        clock,
    }
}
