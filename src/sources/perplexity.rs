//! News-grounded variant: an online-search chat model that judges sentiment
//! from recent coverage, plus the news-context side query consumed by later
//! cascade stages.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    parse_judgment, status_failure, transport_failure, JudgmentDefaults, NewsResearcher,
    SentimentSource, SourceOutcome,
};

const ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";
const MODEL: &str = "llama-3.1-sonar-large-128k-online";

const DEFAULTS: JudgmentDefaults = JudgmentDefaults {
    confidence: 0.5,
    reasoning: "News-based sentiment",
};

pub struct PerplexitySource {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl PerplexitySource {
    pub fn new(api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("market-sentiment-aggregator/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self { http, api_key }
    }

    async fn chat(&self, system: &str, user: &str, max_tokens: u32) -> Result<ChatReply, super::SourceFailure> {
        let key = self.api_key.as_deref().unwrap_or_default();
        let req = ChatRequest {
            model: MODEL,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens,
            temperature: 0.2,
            return_citations: true,
            search_recency_filter: "week",
        };

        let resp = self
            .http
            .post(ENDPOINT)
            .bearer_auth(key)
            .json(&req)
            .send()
            .await
            .map_err(transport_failure)?;

        if !resp.status().is_success() {
            return Err(status_failure(resp.status()));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| super::SourceFailure::Malformed(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.is_empty() {
            return Err(super::SourceFailure::Malformed("empty completion".into()));
        }
        Ok(ChatReply {
            content,
            citations: body.citations,
        })
    }
}

#[async_trait]
impl SentimentSource for PerplexitySource {
    fn name(&self) -> &'static str {
        "perplexity"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    // News grounding is built into the model's own search; the cascade's
    // shared context is for the later stages, not this one.
    async fn analyze(
        &self,
        title: &str,
        description: &str,
        _context: Option<&str>,
    ) -> SourceOutcome {
        if !self.is_available() {
            return SourceOutcome::Unavailable;
        }

        let system = "You are a sentiment analysis expert. Analyze news sentiment and provide \
                      a score from -1 (very negative) to 1 (very positive). Return ONLY valid \
                      JSON with keys: score, confidence, reasoning, factors.";
        let user = sentiment_query(title, description);

        match self.chat(system, &user, 800).await {
            Ok(reply) => match parse_judgment(&reply.content, DEFAULTS) {
                Ok(judgment) => {
                    info!(score = judgment.score, "news-grounded judgment produced");
                    SourceOutcome::Judgment(judgment)
                }
                Err(failure) => SourceOutcome::Failed(failure),
            },
            Err(failure) => SourceOutcome::Failed(failure),
        }
    }
}

#[async_trait]
impl NewsResearcher for PerplexitySource {
    async fn market_news(&self, title: &str, description: &str) -> Option<String> {
        if !self.is_available() {
            return None;
        }

        let system = "You are a news research assistant. Search for the latest news and \
                      provide a concise summary focused on sentiment and market-moving \
                      information.";
        let user = news_query(title, description);

        match self.chat(system, &user, 1000).await {
            Ok(reply) => {
                info!(citations = reply.citations.len(), "news context fetched");
                Some(format_news_summary(reply.content, &reply.citations))
            }
            Err(failure) => {
                warn!(error = %failure, "news search failed, continuing without context");
                None
            }
        }
    }
}

fn sentiment_query(title: &str, description: &str) -> String {
    format!(
        "Analyze news sentiment about:\n\n\
         **Topic:** {title}\n\
         **Context:** {description}\n\n\
         Based on recent news from the past week, provide sentiment analysis as JSON:\n\
         {{\n\
         \x20   \"score\": <float from -1 to 1>,\n\
         \x20   \"confidence\": <float from 0 to 1>,\n\
         \x20   \"reasoning\": \"<explanation of sentiment>\",\n\
         \x20   \"factors\": []\n\
         }}\n\n\
         Consider positive developments (+1 direction), negative news and concerns \
         (-1 direction), and confidence based on consensus and source quality."
    )
}

fn news_query(title: &str, description: &str) -> String {
    format!(
        "Search for the latest news and developments about:\n\n\
         **Topic:** {title}\n\
         **Context:** {description}\n\n\
         Provide a concise summary of recent news, key events or announcements, public \
         sentiment and reactions, and expert opinions. Focus on factual information from \
         the past week."
    )
}

fn format_news_summary(content: String, citations: &[String]) -> String {
    if citations.is_empty() {
        return content;
    }
    let mut summary = content;
    summary.push_str("\n\n**Sources:**\n");
    for (i, citation) in citations.iter().take(5).enumerate() {
        summary.push_str(&format!("{}. {citation}\n", i + 1));
    }
    summary
}

struct ChatReply {
    content: String,
    citations: Vec<String>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    return_citations: bool,
    search_recency_filter: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}
