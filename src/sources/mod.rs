//! Source capability: one uniform interface over the three provider
//! adapters, plus the shared JSON parse defense.
//!
//! Adapters fail softly. Transport errors, auth failures, malformed
//! responses, and missing configuration all map into [`SourceOutcome`]; the
//! aggregator branches on the outcome and must never crash because one
//! provider is down.

pub mod azure;
pub mod gemini;
pub mod perplexity;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::judgment::{clamp01, clamp_score, Judgment};

pub use azure::AzureOpenAiSource;
pub use gemini::GeminiSource;
pub use perplexity::PerplexitySource;

/// Why a source produced no judgment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Result of one provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Judgment(Judgment),
    /// Provider not configured; excluded from the cascade, never an error.
    Unavailable,
    /// Call attempted and failed; demotes the aggregation status.
    Failed(SourceFailure),
}

/// Uniform capability implemented by every provider adapter.
#[async_trait]
pub trait SentimentSource: Send + Sync {
    /// Stable identifier used in results and logs.
    fn name(&self) -> &'static str;

    /// Whether the provider is configured at all.
    fn is_available(&self) -> bool;

    /// Produce a sentiment judgment for the market text, with optional
    /// auxiliary news context.
    async fn analyze(&self, title: &str, description: &str, context: Option<&str>)
        -> SourceOutcome;
}

/// Side channel exposed by the news-grounded variant: free-text summary of
/// recent news, used only as contextual prompt input for later stages.
#[async_trait]
pub trait NewsResearcher: Send + Sync {
    /// Best-effort; every failure maps to `None`.
    async fn market_news(&self, title: &str, description: &str) -> Option<String>;
}

/// News researcher that never finds anything. Used when the news-grounded
/// provider is absent from the wiring.
pub struct NoNews;

#[async_trait]
impl NewsResearcher for NoNews {
    async fn market_news(&self, _title: &str, _description: &str) -> Option<String> {
        None
    }
}

/// Per-variant fill-ins for fields a provider may omit.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JudgmentDefaults {
    pub confidence: f64,
    pub reasoning: &'static str,
}

#[derive(Debug, Deserialize)]
struct RawJudgment {
    score: Option<f64>,
    confidence: Option<f64>,
    reasoning: Option<String>,
    factors: Option<Vec<String>>,
}

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fenced json regex"));

/// Parse a model response into a [`Judgment`], defending against non-JSON
/// and partially-JSON output.
///
/// Accepts raw JSON, JSON inside a markdown code fence, or JSON embedded in
/// surrounding prose. The score is clamped into [-1, 1] and the confidence
/// into [0, 1]; this is the single normalization point for both ranges.
pub(crate) fn parse_judgment(
    content: &str,
    defaults: JudgmentDefaults,
) -> Result<Judgment, SourceFailure> {
    let raw = try_parse_raw(content)
        .ok_or_else(|| SourceFailure::Malformed("no JSON object in response".into()))?;

    Ok(Judgment {
        score: clamp_score(raw.score.unwrap_or(0.0)),
        confidence: clamp01(raw.confidence.unwrap_or(defaults.confidence)),
        reasoning: raw
            .reasoning
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| defaults.reasoning.to_string()),
        factors: raw.factors.unwrap_or_default(),
    })
}

fn try_parse_raw(content: &str) -> Option<RawJudgment> {
    let trimmed = content.trim();
    if let Ok(raw) = serde_json::from_str::<RawJudgment>(trimmed) {
        return Some(raw);
    }

    // Models frequently wrap JSON in a markdown fence despite instructions.
    if let Some(cap) = FENCED_JSON.captures(trimmed) {
        if let Ok(raw) = serde_json::from_str::<RawJudgment>(&cap[1]) {
            return Some(raw);
        }
    }

    // Last resort: the outermost brace-delimited span.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        return serde_json::from_str::<RawJudgment>(&trimmed[start..=end]).ok();
    }
    None
}

/// Map a reqwest error onto the failure taxonomy.
pub(crate) fn transport_failure(err: reqwest::Error) -> SourceFailure {
    if err.is_timeout() {
        SourceFailure::Timeout
    } else {
        SourceFailure::Transport(err.to_string())
    }
}

/// Map a non-success HTTP status onto the failure taxonomy.
pub(crate) fn status_failure(status: reqwest::StatusCode) -> SourceFailure {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        SourceFailure::Auth(format!("status {status}"))
    } else {
        SourceFailure::Transport(format!("status {status}"))
    }
}
