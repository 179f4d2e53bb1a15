//! Integration tests for the HTTP boundary, driving the in-process router
//! with scripted sources and a scripted market-data gateway.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt; // for oneshot

use market_sentiment_aggregator::aggregator::{CascadeOptions, SentimentAggregator};
use market_sentiment_aggregator::api::{create_router, AppState};
use market_sentiment_aggregator::clock::ManualClock;
use market_sentiment_aggregator::judgment::Judgment;
use market_sentiment_aggregator::market_data::{
    Market, MarketDataError, MarketDataService, MarketsGateway, MemoryMarketStore, PricePoint,
};
use market_sentiment_aggregator::sources::{
    NoNews, SentimentSource, SourceFailure, SourceOutcome,
};

struct FakeSource {
    name: &'static str,
    available: bool,
    outcome: SourceOutcome,
}

impl FakeSource {
    fn judging(name: &'static str, score: f64, confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            name,
            available: true,
            outcome: SourceOutcome::Judgment(Judgment {
                score,
                confidence,
                reasoning: "scripted".into(),
                factors: Vec::new(),
            }),
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            available: true,
            outcome: SourceOutcome::Failed(SourceFailure::Transport("down".into())),
        })
    }
}

#[async_trait]
impl SentimentSource for FakeSource {
    fn name(&self) -> &'static str {
        self.name
    }
    fn is_available(&self) -> bool {
        self.available
    }
    async fn analyze(&self, _t: &str, _d: &str, _c: Option<&str>) -> SourceOutcome {
        self.outcome.clone()
    }
}

struct FakeGateway {
    fail: AtomicBool,
    market_fetches: AtomicUsize,
    price_fetches: AtomicUsize,
}

impl FakeGateway {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            market_fetches: AtomicUsize::new(0),
            price_fetches: AtomicUsize::new(0),
        })
    }

    fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MarketsGateway for FakeGateway {
    async fn fetch_markets(&self, _active_only: bool) -> Result<Vec<Market>, MarketDataError> {
        self.market_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(MarketDataError::Transport("connection refused".into()));
        }
        Ok(vec![Market {
            token_id: "0x1".into(),
            question: "Will the launch succeed?".into(),
            description: "Resolves YES on success.".into(),
            end_date: None,
            outcome_prices: Value::Null,
            volume: 42.0,
            active: true,
        }])
    }

    async fn fetch_price(&self, token_id: &str) -> Result<PricePoint, MarketDataError> {
        self.price_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(MarketDataError::Transport("connection refused".into()));
        }
        if token_id == "missing" {
            return Err(MarketDataError::NotFound(token_id.to_string()));
        }
        Ok(PricePoint {
            token_id: token_id.to_string(),
            price: 0.62,
            volume: 42.0,
            timestamp: None,
        })
    }
}

struct Harness {
    app: Router,
    gateway: Arc<FakeGateway>,
    clock: Arc<ManualClock>,
    store: Arc<MemoryMarketStore>,
}

fn build_harness(
    news: Arc<FakeSource>,
    deep: Arc<FakeSource>,
    fallback: Arc<FakeSource>,
) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let gateway = FakeGateway::new();
    let store = Arc::new(MemoryMarketStore::new(clock.clone()));

    let aggregator = Arc::new(SentimentAggregator::new(
        news,
        deep,
        fallback,
        Arc::new(NoNews),
        CascadeOptions::default(),
    ));
    let market_data = Arc::new(MarketDataService::new(
        gateway.clone(),
        store.clone(),
        clock.clone(),
        Duration::from_secs(300),
        Duration::from_secs(5),
    ));

    let app = create_router(AppState {
        aggregator,
        market_data,
        store: store.clone(),
        clock: clock.clone(),
    });

    Harness {
        app,
        gateway,
        clock,
        store,
    }
}

fn default_harness() -> Harness {
    build_harness(
        FakeSource::judging("news", 0.65, 0.75),
        FakeSource::judging("deep", 0.55, 0.80),
        FakeSource::judging("fallback", 0.70, 0.70),
    )
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request build"),
        )
        .await
        .expect("router response");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).expect("serialize")))
                .expect("request build"),
        )
        .await
        .expect("router response");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

// --- TESTS ---

#[tokio::test]
async fn health_reports_source_availability() {
    let h = default_harness();
    let (status, body) = get_json(&h.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sources"]["news_grounded"], true);
    assert_eq!(body["sources"]["deep_reasoning"], true);
    assert_eq!(body["sources"]["fallback"], true);
}

#[tokio::test]
async fn sentiment_happy_path_attaches_id_and_timestamp() {
    let h = default_harness();
    let (status, body) = post_json(
        &h.app,
        "/sentiment",
        json!({
            "market_id": "mkt-1",
            "market_title": "Will the launch succeed?",
            "market_description": "Resolves YES on success."
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["market_id"], "mkt-1");
    assert_eq!(body["status"], "success");
    assert_eq!(body["sources"].as_array().map(Vec::len), Some(2));
    assert!(body["timestamp"].is_string());
    // (0.65*0.30 + 0.55*0.32) / 0.62
    let sentiment = body["consensus_sentiment"].as_f64().expect("sentiment");
    assert!((sentiment - 0.371 / 0.62).abs() < 1e-9);
    assert_eq!(h.store.sentiment_count(), 1, "result must be recorded");
}

#[tokio::test]
async fn sentiment_rejects_missing_fields() {
    let h = default_harness();
    for body in [
        json!({}),
        json!({"market_id": "m", "market_title": "t"}),
        json!({"market_id": "m", "market_title": " ", "market_description": "d"}),
    ] {
        let (status, resp) = post_json(&h.app, "/sentiment", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "Missing required fields");
    }
}

#[tokio::test]
async fn sentiment_total_source_loss_is_still_a_200() {
    let h = build_harness(
        FakeSource::failing("news"),
        FakeSource::failing("deep"),
        FakeSource::failing("fallback"),
    );
    let (status, body) = post_json(
        &h.app,
        "/sentiment",
        json!({
            "market_id": "mkt-1",
            "market_title": "t",
            "market_description": "d"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "degradation is not a transport failure");
    assert_eq!(body["status"], "failed_all_sources");
    assert_eq!(body["consensus_sentiment"], 0.0);
    assert_eq!(body["consensus_confidence"], 0.0);
    assert_eq!(body["sources"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn markets_cached_flag_flips_on_second_request() {
    let h = default_harness();

    let (s1, b1) = get_json(&h.app, "/markets").await;
    assert_eq!(s1, StatusCode::OK);
    assert_eq!(b1["cached"], false);
    assert_eq!(b1["count"], 1);

    let (s2, b2) = get_json(&h.app, "/markets").await;
    assert_eq!(s2, StatusCode::OK);
    assert_eq!(b2["cached"], true);
    assert_eq!(h.gateway.market_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn markets_serves_stale_snapshot_when_upstream_dies() {
    let h = default_harness();
    let (s1, _) = get_json(&h.app, "/markets").await;
    assert_eq!(s1, StatusCode::OK);

    h.gateway.set_failing(true);
    h.clock.advance(chrono::Duration::minutes(10));

    let (s2, body) = get_json(&h.app, "/markets").await;
    assert_eq!(s2, StatusCode::OK);
    assert_eq!(body["stale"], true);
    assert_eq!(body["count"], 1, "prior snapshot is preserved");
    assert!(body["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn markets_failure_without_cache_is_bad_gateway() {
    let h = default_harness();
    h.gateway.set_failing(true);
    let (status, body) = get_json(&h.app, "/markets").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn price_snapshot_includes_history_and_cache_flags() {
    let h = default_harness();

    let (s1, b1) = get_json(&h.app, "/price/0x1").await;
    assert_eq!(s1, StatusCode::OK);
    assert_eq!(b1["token_id"], "0x1");
    assert_eq!(b1["current_price"], 0.62);
    assert_eq!(b1["cached"], false);
    assert_eq!(b1["price_history_24h"].as_array().map(Vec::len), Some(1));

    let (s2, b2) = get_json(&h.app, "/price/0x1").await;
    assert_eq!(s2, StatusCode::OK);
    assert_eq!(b2["cached"], true);
    assert_eq!(h.gateway.price_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn price_force_refresh_bypasses_fresh_entry() {
    let h = default_harness();
    get_json(&h.app, "/price/0x1").await;
    let (status, body) = get_json(&h.app, "/price/0x1?refresh=true").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cached"], false);
    assert_eq!(h.gateway.price_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unknown_token_is_404_when_nothing_is_cached() {
    let h = default_harness();
    let (status, body) = get_json(&h.app, "/price/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}
