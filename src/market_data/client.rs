//! Thin CLOB REST gateway. Wire-level details live here and nowhere else;
//! the rest of the crate consumes the [`MarketsGateway`] trait.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed upstream payload: {0}")]
    Malformed(String),
    #[error("market not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(String),
}

/// One tradeable market as exposed upstream. `outcome_prices` is passed
/// through opaquely; the core never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub token_id: String,
    pub question: String,
    pub description: String,
    pub end_date: Option<String>,
    pub outcome_prices: Value,
    pub volume: f64,
    pub active: bool,
}

/// A single price observation for one token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub token_id: String,
    pub price: f64,
    pub volume: f64,
    pub timestamp: Option<String>,
}

/// Upstream market-data source, implemented by the real CLOB client and by
/// scripted fakes in tests.
#[async_trait]
pub trait MarketsGateway: Send + Sync {
    async fn fetch_markets(&self, active_only: bool) -> Result<Vec<Market>, MarketDataError>;
    async fn fetch_price(&self, token_id: &str) -> Result<PricePoint, MarketDataError>;
}

const MAX_ATTEMPTS: u32 = 3;

pub struct PolymarketClient {
    http: reqwest::Client,
    host: String,
}

impl PolymarketClient {
    pub fn new(host: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("market-sentiment-aggregator/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            http,
            host: host.trim_end_matches('/').to_string(),
        }
    }

    /// GET with retry on transport errors and 5xx, exponential backoff
    /// (1 s, 2 s). Client errors are terminal.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, MarketDataError> {
        let mut last_err = MarketDataError::Transport("no attempts made".into());
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let wait = Duration::from_secs(1 << (attempt - 1));
                warn!(url, attempt, "retrying in {}s", wait.as_secs());
                tokio::time::sleep(wait).await;
            }
            match self.http.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json::<T>()
                            .await
                            .map_err(|e| MarketDataError::Malformed(e.to_string()));
                    }
                    if status.is_server_error() {
                        last_err = MarketDataError::Status(status);
                        continue;
                    }
                    return Err(MarketDataError::Status(status));
                }
                Err(err) => {
                    last_err = MarketDataError::Transport(err.to_string());
                }
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl MarketsGateway for PolymarketClient {
    async fn fetch_markets(&self, active_only: bool) -> Result<Vec<Market>, MarketDataError> {
        let page: MarketsPage = self.get_json(&format!("{}/markets", self.host)).await?;

        let mut markets = Vec::with_capacity(page.data.len());
        for raw in &page.data {
            match parse_market(raw) {
                Some(market) => {
                    if active_only && !market.active {
                        continue;
                    }
                    markets.push(market);
                }
                None => {
                    warn!(
                        condition_id = raw.get("condition_id").and_then(|v| v.as_str()),
                        "skipping unparseable market entry"
                    );
                }
            }
        }
        info!(count = markets.len(), "fetched markets");
        Ok(markets)
    }

    async fn fetch_price(&self, token_id: &str) -> Result<PricePoint, MarketDataError> {
        let url = format!("{}/markets/{token_id}", self.host);
        let market: Value = match self.get_json(&url).await {
            Ok(v) => v,
            Err(MarketDataError::Status(reqwest::StatusCode::NOT_FOUND)) => {
                return Err(MarketDataError::NotFound(token_id.to_string()))
            }
            Err(other) => return Err(other),
        };
        if market.is_null() {
            return Err(MarketDataError::NotFound(token_id.to_string()));
        }

        let price = market
            .get("outcome_prices")
            .and_then(Value::as_array)
            .and_then(|prices| prices.first())
            .and_then(coerce_f64)
            .unwrap_or(0.0);

        Ok(PricePoint {
            token_id: token_id.to_string(),
            price,
            volume: market.get("volume").and_then(coerce_f64).unwrap_or(0.0),
            timestamp: market
                .get("timestamp")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

#[derive(Deserialize)]
struct MarketsPage {
    #[serde(default)]
    data: Vec<Value>,
}

/// Lenient per-entry parse; a market the upstream mangles is skipped, never
/// fatal for the whole fetch.
fn parse_market(raw: &Value) -> Option<Market> {
    let token_id = raw.get("condition_id")?.as_str()?.to_string();
    Some(Market {
        token_id,
        question: raw
            .get("question")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        description: raw
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        end_date: raw
            .get("end_date_iso")
            .and_then(Value::as_str)
            .map(str::to_string),
        outcome_prices: raw.get("outcome_prices").cloned().unwrap_or(Value::Null),
        volume: raw.get("volume").and_then(coerce_f64).unwrap_or(0.0),
        active: raw.get("active").and_then(Value::as_bool).unwrap_or(true),
    })
}

/// Upstream encodes numbers inconsistently (raw numbers or strings).
fn coerce_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
