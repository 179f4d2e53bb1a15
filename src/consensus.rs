//! # Consensus Calculator
//! Pure, deterministic reduction of weighted source judgments into one
//! (sentiment, confidence) pair. No I/O, suitable for unit tests and
//! offline evaluation.
//!
//! The sentiment average is weighted by *both* each source's self-reported
//! confidence and the aggregator's trust weight, so a confident cheap
//! fallback cannot dominate two less-confident premium sources. The
//! confidence average uses trust weight only, to avoid double-penalizing
//! unconfident sources.

use crate::judgment::{clamp01, clamp_score, SourceJudgment};

/// Weighted consensus over the collected judgments.
///
/// ```text
/// effective_weight_i  = confidence_i * weight_i
/// sentiment  = sum(score_i * effective_weight_i) / sum(effective_weight_i)
/// confidence = sum(confidence_i * weight_i)      / sum(weight_i)
/// ```
///
/// Zero denominators yield 0.0 for the affected output. Both outputs are
/// defensively clamped to their valid ranges, independent of the per-source
/// clamping done by adapters.
pub fn weighted_consensus(sources: &[SourceJudgment]) -> (f64, f64) {
    if sources.is_empty() {
        return (0.0, 0.0);
    }

    let mut effective_total = 0.0;
    let mut weight_total = 0.0;
    let mut weighted_sentiment = 0.0;
    let mut weighted_confidence = 0.0;

    for s in sources {
        let effective = s.confidence * s.weight;
        effective_total += effective;
        weight_total += s.weight;
        weighted_sentiment += s.score * effective;
        weighted_confidence += s.confidence * s.weight;
    }

    let sentiment = if effective_total > 0.0 {
        weighted_sentiment / effective_total
    } else {
        0.0
    };
    let confidence = if weight_total > 0.0 {
        weighted_confidence / weight_total
    } else {
        0.0
    };

    (clamp_score(sentiment), clamp01(confidence))
}
