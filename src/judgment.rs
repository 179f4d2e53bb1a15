//! Core data model: per-source judgments and the aggregated consensus result.

use serde::{Deserialize, Serialize};

/// Terminal status of one aggregation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentStatus {
    /// Every attempted stage completed without error.
    Success,
    /// At least one stage errored, but judgments were still collected.
    Partial,
    /// No stage produced a judgment; consensus is forced to neutral.
    FailedAllSources,
}

/// One provider's normalized sentiment assessment, as returned by an adapter.
///
/// Adapters clamp `score` into [-1, 1] and `confidence` into [0, 1] before
/// handing a judgment to the aggregator; nothing downstream re-clamps inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub score: f64,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub factors: Vec<String>,
}

/// A judgment annotated with the aggregator's trust weight for its provider.
///
/// The weight is assigned by the cascade, never by the source itself. Lives
/// only for the duration of one aggregation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceJudgment {
    pub source: String,
    pub score: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub weight: f64,
}

/// Final multi-source result. `sources` keeps cascade call order.
///
/// Invariant: `sources` is empty iff `status == FailedAllSources` iff the
/// consensus pair is exactly (0.0, 0.0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub consensus_sentiment: f64,
    pub consensus_confidence: f64,
    pub sources: Vec<SourceJudgment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub news_context: Option<String>,
    pub status: SentimentStatus,
}

/// Clamp a raw provider score into the valid sentiment range.
pub fn clamp_score(x: f64) -> f64 {
    x.clamp(-1.0, 1.0)
}

/// Clamp into [0.0, 1.0].
pub fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}
