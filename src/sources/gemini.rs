//! Fallback-light variant: a fast, cheap model consulted only when the
//! cascade has fewer than two judgments.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    parse_judgment, status_failure, transport_failure, JudgmentDefaults, SentimentSource,
    SourceFailure, SourceOutcome,
};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const MODEL: &str = "gemini-2.5-flash";

const DEFAULTS: JudgmentDefaults = JudgmentDefaults {
    confidence: 0.6,
    reasoning: "Fallback analysis",
};

pub struct GeminiSource {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl GeminiSource {
    pub fn new(api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("market-sentiment-aggregator/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self { http, api_key }
    }
}

#[async_trait]
impl SentimentSource for GeminiSource {
    fn name(&self) -> &'static str {
        "google_gemini"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn analyze(&self, title: &str, description: &str, context: Option<&str>) -> SourceOutcome {
        let Some(key) = self.api_key.as_deref() else {
            return SourceOutcome::Unavailable;
        };

        let prompt = sentiment_prompt(title, description, context);
        let req = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: 1024,
            },
        };

        let resp = match self
            .http
            .post(format!("{BASE_URL}/{MODEL}:generateContent"))
            .header("x-goog-api-key", key)
            .json(&req)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => return SourceOutcome::Failed(transport_failure(err)),
        };

        if !resp.status().is_success() {
            return SourceOutcome::Failed(status_failure(resp.status()));
        }

        let body: GenerateResponse = match resp.json().await {
            Ok(body) => body,
            Err(err) => return SourceOutcome::Failed(SourceFailure::Malformed(err.to_string())),
        };

        let content = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();
        if content.is_empty() {
            return SourceOutcome::Failed(SourceFailure::Malformed("empty candidate".into()));
        }

        match parse_judgment(&content, DEFAULTS) {
            Ok(judgment) => {
                info!(score = judgment.score, "fallback judgment produced");
                SourceOutcome::Judgment(judgment)
            }
            Err(failure) => SourceOutcome::Failed(failure),
        }
    }
}

fn sentiment_prompt(title: &str, description: &str, context: Option<&str>) -> String {
    let mut prompt = format!(
        "Analyze the sentiment for this prediction market and return ONLY valid JSON:\n\n\
         **Market Title:** {title}\n\
         **Market Description:** {description}\n"
    );
    if let Some(news) = context {
        prompt.push_str(&format!("\n**Additional Context:**\n{news}\n"));
    }
    prompt.push_str(
        "\nProvide sentiment analysis as JSON with these exact keys:\n\
         {\n\
         \x20   \"score\": <float from -1 to 1>,\n\
         \x20   \"confidence\": <float from 0 to 1>,\n\
         \x20   \"reasoning\": \"<explanation of the sentiment score>\",\n\
         \x20   \"factors\": [\"<factor 1>\", \"<factor 2>\", \"<factor 3>\"]\n\
         }\n\n\
         Return ONLY the JSON object, no additional text.\n",
    );
    prompt
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_source_reports_unavailable() {
        let src = GeminiSource::new(None);
        assert!(!src.is_available());
        assert_eq!(src.analyze("t", "d", None).await, SourceOutcome::Unavailable);
    }

    #[test]
    fn prompt_carries_shared_context() {
        let p = sentiment_prompt("t", "d", Some("cpi cooled"));
        assert!(p.contains("Additional Context"));
        assert!(p.contains("cpi cooled"));
    }
}
