//! Tavily search API provider.

use crate::{http, params};
use async_trait::async_trait;
use scrivener_core::error::SearchError;
use scrivener_core::search::{SearchOptions, SearchProvider, SourceRecord, SourceType};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

pub const TAVILY_API_KEY_ENV: &str = "TAVILY_API_KEY";

const NAME: &str = "tavily";
const DEFAULT_BASE_URL: &str = "https://api.tavily.com";
const ACCEPTED_OPTIONS: &[&str] = &["max_results", "include_raw_content", "topic"];

/// Tavily web search. One request per query; the federator runs them concurrently.
pub struct TavilyProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl TavilyProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SearchError> {
        Ok(Self {
            client: http::build_client(NAME, Duration::from_secs(30))?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Create a provider using `TAVILY_API_KEY`.
    pub fn from_env() -> Result<Self, SearchError> {
        Self::new(http::api_key_from_env(NAME, TAVILY_API_KEY_ENV)?)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Request body for one query. Defaults: 5 results, raw content on, general topic.
fn request_body(query: &str, options: &SearchOptions) -> Result<Value, SearchError> {
    let max_results = params::u64_opt(NAME, options, "max_results")?.unwrap_or(5);
    let include_raw_content = params::bool_opt(NAME, options, "include_raw_content")?.unwrap_or(true);
    let topic = params::str_opt(NAME, options, "topic")?.unwrap_or("general");
    Ok(json!({
        "query": query,
        "max_results": max_results,
        "include_raw_content": include_raw_content,
        "topic": topic,
    }))
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    raw_content: Option<String>,
}

impl TavilyResponse {
    fn into_records(self, source_type: SourceType) -> Vec<SourceRecord> {
        self.results
            .into_iter()
            .map(|r| {
                let mut record = SourceRecord::new(r.title, r.url, r.content, r.score)
                    .with_source_type(source_type);
                record.raw_content = r.raw_content.filter(|raw| !raw.is_empty());
                record
            })
            .collect()
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
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
        let source_type = if body["topic"] == "news" {
            SourceType::News
        } else {
            SourceType::Web
        };
        debug!(query, "Tavily search");

        let request = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let response: TavilyResponse = http::send_json(NAME, request).await?;
        Ok(response.into_records(source_type))
    }
}
