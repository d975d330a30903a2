//! Perplexity answer-engine provider.
//!
//! Perplexity answers with one synthesized text plus a citation list. The
//! answer is attached to the first citation; later citations are kept as
//! lower-scored pointers without content of their own.

use crate::{http, params};
use async_trait::async_trait;
use scrivener_core::error::SearchError;
use scrivener_core::search::{SearchOptions, SearchProvider, SourceRecord, SourceType};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

pub const PERPLEXITY_API_KEY_ENV: &str = "PERPLEXITY_API_KEY";

const NAME: &str = "perplexity";
const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "sonar-pro";
const ACCEPTED_OPTIONS: &[&str] = &["model"];
const SYSTEM_PROMPT: &str = "Search the web and provide factual information with sources.";
const FALLBACK_CITATION: &str = "https://perplexity.ai";
const SECONDARY_CONTENT: &str = "See primary source for full content";

pub struct PerplexityProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PerplexityProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SearchError> {
        Ok(Self {
            client: http::build_client(NAME, Duration::from_secs(90))?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Create a provider using `PERPLEXITY_API_KEY`.
    pub fn from_env() -> Result<Self, SearchError> {
        Self::new(http::api_key_from_env(NAME, PERPLEXITY_API_KEY_ENV)?)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

fn request_body(query: &str, options: &SearchOptions) -> Result<Value, SearchError> {
    let model = params::str_opt(NAME, options, "model")?.unwrap_or(DEFAULT_MODEL);
    Ok(json!({
        "model": model,
        "messages": [
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": query},
        ],
    }))
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

impl ChatResponse {
    fn into_records(self) -> Result<Vec<SourceRecord>, SearchError> {
        let answer = self
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SearchError::ResponseParse {
                provider: NAME.to_string(),
                message: "response has no choices".to_string(),
            })?;

        let citations = if self.citations.is_empty() {
            vec![FALLBACK_CITATION.to_string()]
        } else {
            self.citations
        };

        let records = citations
            .into_iter()
            .enumerate()
            .map(|(i, url)| {
                let title = format!("Perplexity Search, Source {}", i + 1);
                let record = if i == 0 {
                    SourceRecord::new(title, url, answer.clone(), 1.0).with_raw_content(answer.clone())
                } else {
                    SourceRecord::new(title, url, SECONDARY_CONTENT, 0.5)
                };
                record.with_source_type(SourceType::AnswerEngine)
            })
            .collect();
        Ok(records)
    }
}

#[async_trait]
impl SearchProvider for PerplexityProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn accepted_options(&self) -> &[&'static str] {
        ACCEPTED_OPTIONS
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SourceRecord>, SearchError> {
        let body = request_body(query, options)?;
        debug!(query, model = %body["model"], "Perplexity search");

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .json(&body);
        let response: ChatResponse = http::send_json(NAME, request).await?;
        response.into_records()
    }
}
