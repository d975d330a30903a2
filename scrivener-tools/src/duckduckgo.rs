//! DuckDuckGo instant-answer provider. Keyless.
//!
//! The instant-answer API returns an abstract plus related topics rather than
//! a ranked result list, so coverage is thinner than the paid providers.

use crate::{http, params};
use async_trait::async_trait;
use scrivener_core::error::SearchError;
use scrivener_core::search::{SearchOptions, SearchProvider, SourceRecord};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const NAME: &str = "duckduckgo";
const DEFAULT_BASE_URL: &str = "https://api.duckduckgo.com";
const ACCEPTED_OPTIONS: &[&str] = &["max_results"];
const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_RESULTS_CAP: usize = 10;

pub struct DuckDuckGoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl DuckDuckGoProvider {
    pub fn new() -> Result<Self, SearchError> {
        Ok(Self {
            client: http::build_client(NAME, Duration::from_secs(15))?,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

fn search_url(base_url: &str, query: &str) -> String {
    format!(
        "{}/?q={}&format=json&no_html=1&skip_disambig=1",
        base_url,
        urlencoding::encode(query)
    )
}

/// Pull records out of an instant-answer body: the abstract first, then the
/// `Results` array, then related topics (flattening topic groups).
fn parse_body(body: &Value, max_results: usize) -> Vec<SourceRecord> {
    let mut records = Vec::new();

    if let Some(text) = body.get("AbstractText").and_then(Value::as_str)
        && !text.is_empty()
    {
        let url = body.get("AbstractURL").and_then(Value::as_str).unwrap_or("");
        let title = body
            .get("Heading")
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
            .or_else(|| body.get("AbstractSource").and_then(Value::as_str))
            .unwrap_or("DuckDuckGo");
        records.push(SourceRecord::new(title, url, text, 1.0).with_metadata(
            "source",
            body.get("AbstractSource").cloned().unwrap_or(Value::Null),
        ));
    }

    let results = body.get("Results").and_then(Value::as_array);
    for item in results.into_iter().flatten() {
        push_topic(&mut records, item, 0.8);
    }

    let related = body.get("RelatedTopics").and_then(Value::as_array);
    for item in related.into_iter().flatten() {
        match item.get("Topics").and_then(Value::as_array) {
            Some(group) => group.iter().for_each(|t| push_topic(&mut records, t, 0.5)),
            None => push_topic(&mut records, item, 0.5),
        }
    }

    records.truncate(max_results);
    records
}

fn push_topic(records: &mut Vec<SourceRecord>, topic: &Value, score: f64) {
    let Some(text) = topic.get("Text").and_then(Value::as_str) else {
        return;
    };
    let url = topic.get("FirstURL").and_then(Value::as_str).unwrap_or("");
    if url.is_empty() {
        return;
    }
    // Topic text reads "Title - description"
    let title = text.split(" - ").next().unwrap_or(text);
    records.push(SourceRecord::new(title, url, text, score));
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
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
        let max_results = params::u64_opt(NAME, options, "max_results")?
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .min(MAX_RESULTS_CAP);
        debug!(query, max_results, "DuckDuckGo search");

        let request = self.client.get(search_url(&self.base_url, query));
        let body: Value = http::send_json(NAME, request).await?;
        Ok(parse_body(&body, max_results))
    }
}
