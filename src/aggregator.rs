//! # Sentiment Aggregator
//! Orchestrates the cascade across the three source capabilities, assigns
//! trust weights, and classifies the degree of degradation.
//!
//! Cascade order:
//! 1. news-grounded (weight 0.4) — also issues the best-effort news side
//!    query whose text later stages may consume
//! 2. deep-reasoning (weight 0.4) — always attempted
//! 3. fallback-light (weight 0.2) — only when fewer than 2 judgments exist
//!
//! Every stage is independently fallible; a stage failure is logged and
//! demotes the result to `Partial`, never aborts siblings. Zero judgments
//! after the full cascade force a neutral `FailedAllSources` result.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};

use crate::consensus::weighted_consensus;
use crate::judgment::{ConsensusResult, SentimentStatus, SourceJudgment};
use crate::sources::{NewsResearcher, SentimentSource, SourceOutcome};

/// Trust weights the aggregator assigns per stage. Sources never pick their
/// own weight.
#[derive(Debug, Clone, Copy)]
pub struct CascadeWeights {
    pub news_grounded: f64,
    pub deep_reasoning: f64,
    pub fallback: f64,
}

impl Default for CascadeWeights {
    fn default() -> Self {
        Self {
            news_grounded: 0.4,
            deep_reasoning: 0.4,
            fallback: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CascadeOptions {
    /// Upper bound for any single stage call (including the news side query).
    pub stage_timeout: Duration,
    /// Upper bound for the whole cascade. A stage reached after the deadline
    /// is treated as a soft failure.
    pub overall_deadline: Duration,
    /// When set, the deep-reasoning stage waits for the news-grounded stage
    /// and consumes its news context. When unset the two stages run
    /// concurrently and deep-reasoning gets no context.
    pub share_news_context: bool,
}

impl Default for CascadeOptions {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(30),
            overall_deadline: Duration::from_secs(90),
            share_news_context: true,
        }
    }
}

/// Availability of each configured stage, reported by the health endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SourceAvailability {
    pub news_grounded: bool,
    pub deep_reasoning: bool,
    pub fallback: bool,
}

struct StageRun {
    judgment: Option<SourceJudgment>,
    errored: bool,
}

pub struct SentimentAggregator {
    news_grounded: Arc<dyn SentimentSource>,
    deep_reasoning: Arc<dyn SentimentSource>,
    fallback: Arc<dyn SentimentSource>,
    news: Arc<dyn NewsResearcher>,
    weights: CascadeWeights,
    opts: CascadeOptions,
}

impl SentimentAggregator {
    pub fn new(
        news_grounded: Arc<dyn SentimentSource>,
        deep_reasoning: Arc<dyn SentimentSource>,
        fallback: Arc<dyn SentimentSource>,
        news: Arc<dyn NewsResearcher>,
        opts: CascadeOptions,
    ) -> Self {
        Self {
            news_grounded,
            deep_reasoning,
            fallback,
            news,
            weights: CascadeWeights::default(),
            opts,
        }
    }

    pub fn with_weights(mut self, weights: CascadeWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn availability(&self) -> SourceAvailability {
        SourceAvailability {
            news_grounded: self.news_grounded.is_available(),
            deep_reasoning: self.deep_reasoning.is_available(),
            fallback: self.fallback.is_available(),
        }
    }

    /// Run the full cascade and reduce the collected judgments to one
    /// consensus. Never fails: total source loss is reported through the
    /// status field, not an error.
    pub async fn analyze_multi_source(&self, title: &str, description: &str) -> ConsensusResult {
        let deadline = Instant::now() + self.opts.overall_deadline;

        let (stage_a, stage_b, news_context) = if self.opts.share_news_context {
            let context = self.fetch_news(title, description, deadline).await;
            let a = self
                .run_stage(
                    self.news_grounded.as_ref(),
                    self.weights.news_grounded,
                    title,
                    description,
                    None,
                    deadline,
                )
                .await;
            let b = self
                .run_stage(
                    self.deep_reasoning.as_ref(),
                    self.weights.deep_reasoning,
                    title,
                    description,
                    context.as_deref(),
                    deadline,
                )
                .await;
            (a, b, context)
        } else {
            // No data dependency between the primaries; run them side by
            // side. The news query stays attached to the news-grounded leg.
            let news_leg = async {
                let context = self.fetch_news(title, description, deadline).await;
                let a = self
                    .run_stage(
                        self.news_grounded.as_ref(),
                        self.weights.news_grounded,
                        title,
                        description,
                        None,
                        deadline,
                    )
                    .await;
                (context, a)
            };
            let deep_leg = self.run_stage(
                self.deep_reasoning.as_ref(),
                self.weights.deep_reasoning,
                title,
                description,
                None,
                deadline,
            );
            let ((context, a), b) = tokio::join!(news_leg, deep_leg);
            (a, b, context)
        };

        let mut errored = stage_a.errored || stage_b.errored;
        let mut sources: Vec<SourceJudgment> = Vec::new();
        sources.extend(stage_a.judgment);
        sources.extend(stage_b.judgment);

        // Two strong opinions make the cheap fallback unnecessary.
        if sources.len() < 2 {
            let stage_c = self
                .run_stage(
                    self.fallback.as_ref(),
                    self.weights.fallback,
                    title,
                    description,
                    news_context.as_deref(),
                    deadline,
                )
                .await;
            errored |= stage_c.errored;
            sources.extend(stage_c.judgment);
        }

        if sources.is_empty() {
            warn!("all sentiment sources failed, returning neutral");
            return ConsensusResult {
                consensus_sentiment: 0.0,
                consensus_confidence: 0.0,
                sources,
                news_context,
                status: SentimentStatus::FailedAllSources,
            };
        }

        let (consensus_sentiment, consensus_confidence) = weighted_consensus(&sources);
        info!(
            sentiment = consensus_sentiment,
            confidence = consensus_confidence,
            sources = sources.len(),
            "consensus calculated"
        );

        ConsensusResult {
            consensus_sentiment,
            consensus_confidence,
            sources,
            news_context,
            status: if errored {
                SentimentStatus::Partial
            } else {
                SentimentStatus::Success
            },
        }
    }

    async fn fetch_news(&self, title: &str, description: &str, deadline: Instant) -> Option<String> {
        let Some(budget) = self.stage_budget(deadline) else {
            return None;
        };
        match timeout(budget, self.news.market_news(title, description)).await {
            Ok(context) => context,
            Err(_) => {
                warn!("news context query timed out, continuing without context");
                None
            }
        }
    }

    async fn run_stage(
        &self,
        source: &dyn SentimentSource,
        weight: f64,
        title: &str,
        description: &str,
        context: Option<&str>,
        deadline: Instant,
    ) -> StageRun {
        if !source.is_available() {
            info!(source = source.name(), "source not configured, skipping stage");
            return StageRun {
                judgment: None,
                errored: false,
            };
        }

        let Some(budget) = self.stage_budget(deadline) else {
            warn!(source = source.name(), "cascade deadline exhausted before stage");
            return StageRun {
                judgment: None,
                errored: true,
            };
        };

        match timeout(budget, source.analyze(title, description, context)).await {
            Ok(SourceOutcome::Judgment(j)) => StageRun {
                judgment: Some(SourceJudgment {
                    source: source.name().to_string(),
                    score: j.score,
                    confidence: j.confidence,
                    reasoning: j.reasoning,
                    weight,
                }),
                errored: false,
            },
            Ok(SourceOutcome::Unavailable) => StageRun {
                judgment: None,
                errored: false,
            },
            Ok(SourceOutcome::Failed(failure)) => {
                warn!(source = source.name(), error = %failure, "stage failed");
                StageRun {
                    judgment: None,
                    errored: true,
                }
            }
            Err(_) => {
                warn!(source = source.name(), "stage timed out");
                StageRun {
                    judgment: None,
                    errored: true,
                }
            }
        }
    }

    /// Remaining time for one stage call, or `None` when the overall
    /// deadline is spent.
    fn stage_budget(&self, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            None
        } else {
            Some(remaining.min(self.opts.stage_timeout))
        }
    }
}
