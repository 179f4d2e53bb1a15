//! Deep-reasoning variant: an Azure-hosted chat deployment asked for a
//! structured sentiment judgment, optionally grounded by news context from
//! an earlier cascade stage.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    parse_judgment, status_failure, transport_failure, JudgmentDefaults, SentimentSource,
    SourceFailure, SourceOutcome,
};

const API_VERSION: &str = "2025-01-01-preview";

const DEFAULTS: JudgmentDefaults = JudgmentDefaults {
    confidence: 0.7,
    reasoning: "Deep model analysis",
};

pub struct AzureOpenAiSource {
    http: reqwest::Client,
    endpoint: Option<String>,
    deployment: String,
    api_key: Option<String>,
}

impl AzureOpenAiSource {
    pub fn new(endpoint: Option<String>, deployment: String, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("market-sentiment-aggregator/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            deployment,
            api_key,
        }
    }

    fn url(&self) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| {
            format!(
                "{endpoint}/openai/deployments/{}/chat/completions?api-version={API_VERSION}",
                self.deployment
            )
        })
    }
}

#[async_trait]
impl SentimentSource for AzureOpenAiSource {
    fn name(&self) -> &'static str {
        "azure_openai"
    }

    fn is_available(&self) -> bool {
        self.endpoint.is_some() && self.api_key.is_some()
    }

    async fn analyze(&self, title: &str, description: &str, context: Option<&str>) -> SourceOutcome {
        let (Some(url), Some(key)) = (self.url(), self.api_key.as_deref()) else {
            return SourceOutcome::Unavailable;
        };

        let system = "You are an expert prediction market analyst. Analyze sentiment and \
                      provide a score from -1 (very negative) to 1 (very positive). Return \
                      ONLY valid JSON with keys: score, confidence, reasoning, factors.";
        let user = sentiment_prompt(title, description, context);

        let req = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.3,
            max_tokens: 1000,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let resp = match self
            .http
            .post(&url)
            .header("api-key", key)
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

        let body: ChatResponse = match resp.json().await {
            Ok(body) => body,
            Err(err) => return SourceOutcome::Failed(SourceFailure::Malformed(err.to_string())),
        };

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.is_empty() {
            return SourceOutcome::Failed(SourceFailure::Malformed("empty completion".into()));
        }

        match parse_judgment(&content, DEFAULTS) {
            Ok(judgment) => {
                info!(score = judgment.score, "deep-reasoning judgment produced");
                SourceOutcome::Judgment(judgment)
            }
            Err(failure) => SourceOutcome::Failed(failure),
        }
    }
}

fn sentiment_prompt(title: &str, description: &str, context: Option<&str>) -> String {
    let mut prompt = format!(
        "Analyze the sentiment for this prediction market:\n\n\
         **Title:** {title}\n\
         **Description:** {description}\n"
    );
    if let Some(news) = context {
        prompt.push_str(&format!("\n**Recent News Context:**\n{news}\n"));
    }
    prompt.push_str(
        "\nProvide sentiment analysis with:\n\
         1. **score**: Float from -1 (very negative) to 1 (very positive)\n\
         2. **confidence**: Float from 0 to 1 indicating analysis confidence\n\
         3. **reasoning**: Explanation of the sentiment score\n\
         4. **factors**: List of key factors influencing sentiment\n\n\
         Return as JSON.\n",
    );
    prompt
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}
