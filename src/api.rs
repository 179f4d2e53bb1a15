//! HTTP boundary. Thin by design: request parsing, field validation, and
//! status-code mapping live here; everything interesting happens in the
//! aggregator and the market data service.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::aggregator::{SentimentAggregator, SourceAvailability};
use crate::clock::Clock;
use crate::judgment::ConsensusResult;
use crate::market_data::{
    Market, MarketDataError, MarketDataService, MarketStore, PriceSnapshot,
};

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<SentimentAggregator>,
    pub market_data: Arc<MarketDataService>,
    pub store: Arc<dyn MarketStore>,
    pub clock: Arc<dyn Clock>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/markets", get(markets))
        .route("/price/{token_id}", get(price))
        .route("/sentiment", post(sentiment))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    sources: SourceAvailability,
    timestamp: DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        sources: state.aggregator.availability(),
        timestamp: state.clock.now(),
    })
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct MarketsQuery {
    #[serde(default)]
    refresh: bool,
    #[serde(default = "default_true")]
    active_only: bool,
}

#[derive(Serialize)]
struct MarketsResponse {
    markets: Vec<Market>,
    count: usize,
    cached: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    timestamp: DateTime<Utc>,
}

async fn markets(State(state): State<AppState>, Query(q): Query<MarketsQuery>) -> Response {
    counter!("markets_requests_total").increment(1);
    match state.market_data.markets(q.active_only, q.refresh).await {
        Ok(lookup) => Json(MarketsResponse {
            markets: lookup.value.markets,
            count: lookup.value.count,
            cached: lookup.was_cache_hit,
            stale: lookup.is_stale,
            error: lookup.stale_error,
            timestamp: state.clock.now(),
        })
        .into_response(),
        Err(err) => error_response(err, state.clock.now()),
    }
}

#[derive(Deserialize)]
struct PriceQuery {
    #[serde(default)]
    refresh: bool,
}

#[derive(Serialize)]
struct PriceResponse {
    #[serde(flatten)]
    snapshot: PriceSnapshot,
    cached: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    timestamp: DateTime<Utc>,
}

async fn price(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
    Query(q): Query<PriceQuery>,
) -> Response {
    counter!("price_requests_total").increment(1);
    match state.market_data.price(&token_id, q.refresh).await {
        Ok(lookup) => Json(PriceResponse {
            snapshot: lookup.value,
            cached: lookup.was_cache_hit,
            stale: lookup.is_stale,
            error: lookup.stale_error,
            timestamp: state.clock.now(),
        })
        .into_response(),
        Err(err) => error_response(err, state.clock.now()),
    }
}

#[derive(Deserialize)]
struct SentimentRequest {
    market_id: Option<String>,
    market_title: Option<String>,
    market_description: Option<String>,
}

#[derive(Serialize)]
struct SentimentResponse {
    market_id: String,
    #[serde(flatten)]
    result: ConsensusResult,
    timestamp: DateTime<Utc>,
}

async fn sentiment(
    State(state): State<AppState>,
    Json(body): Json<SentimentRequest>,
) -> Response {
    let required = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(market_id), Some(title), Some(description)) = (
        required(body.market_id),
        required(body.market_title),
        required(body.market_description),
    ) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Missing required fields",
                "required": ["market_id", "market_title", "market_description"],
            })),
        )
            .into_response();
    };

    counter!("sentiment_requests_total").increment(1);
    let result = state.aggregator.analyze_multi_source(&title, &description).await;

    // Recording is best-effort; a storage outage never fails the request.
    if let Err(err) = state.store.record_sentiment(&market_id, &result).await {
        warn!(market_id = %market_id, error = %err, "failed to store sentiment result, continuing");
    }

    Json(SentimentResponse {
        market_id,
        result,
        timestamp: state.clock.now(),
    })
    .into_response()
}

fn error_response(err: MarketDataError, timestamp: DateTime<Utc>) -> Response {
    let status = match &err {
        MarketDataError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(json!({
            "error": err.to_string(),
            "timestamp": timestamp,
        })),
    )
        .into_response()
}
