//! Environment-driven configuration, resolved once at process start.
//! `.env` is loaded by the binary before this runs; unset values fall back
//! to defaults that keep the service bootable with zero providers
//! configured (the cascade then degrades instead of failing).

use std::env;
use std::time::Duration;

use crate::aggregator::CascadeOptions;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,

    pub perplexity_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub azure_endpoint: Option<String>,
    pub azure_deployment: String,
    pub azure_api_key: Option<String>,

    pub polymarket_host: String,

    pub cascade: CascadeOptions,
    pub markets_ttl: Duration,
    pub price_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8000"),

            perplexity_api_key: env_opt("PERPLEXITY_API_KEY"),
            gemini_api_key: env_opt("GEMINI_API_KEY"),
            azure_endpoint: env_opt("AZURE_OPENAI_ENDPOINT"),
            azure_deployment: env_or("AZURE_OPENAI_DEPLOYMENT", "gpt-5-pro"),
            azure_api_key: env_opt("AZURE_OPENAI_KEY"),

            polymarket_host: env_or("POLYMARKET_HOST", "https://clob.polymarket.com"),

            cascade: CascadeOptions {
                stage_timeout: env_ms("SENTIMENT_STAGE_TIMEOUT_MS", 30_000),
                overall_deadline: env_ms("SENTIMENT_DEADLINE_MS", 90_000),
                share_news_context: env_flag("SENTIMENT_SHARE_NEWS_CONTEXT", true),
            },
            markets_ttl: env_ms("MARKETS_CACHE_TTL_MS", 300_000),
            price_ttl: env_ms("PRICE_CACHE_TTL_MS", 5_000),
        }
    }
}

/// Non-empty trimmed value or `None`.
fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_ms(name: &str, default_ms: u64) -> Duration {
    let ms = env_opt(name)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

fn env_flag(name: &str, default: bool) -> bool {
    match env_opt(name).as_deref() {
        Some("1") | Some("true") => true,
        Some("0") | Some("false") => false,
        _ => default,
    }
}
