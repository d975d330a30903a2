//! Exa neural search provider.
//!
//! Exa caps request rates, so batches go out sequentially with a short gap
//! instead of all at once.

use crate::{http, params};
use async_trait::async_trait;
use scrivener_core::error::SearchError;
use scrivener_core::search::{QueryOutcome, SearchOptions, SearchProvider, SourceRecord};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

pub const EXA_API_KEY_ENV: &str = "EXA_API_KEY";

const NAME: &str = "exa";
const DEFAULT_BASE_URL: &str = "https://api.exa.ai";
const ACCEPTED_OPTIONS: &[&str] = &[
    "max_characters",
    "num_results",
    "include_domains",
    "exclude_domains",
    "subpages",
];
/// Gap between sequential requests (4/s, under Exa's 5/s limit).
const REQUEST_GAP: Duration = Duration::from_millis(250);
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);

pub struct ExaProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ExaProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SearchError> {
        Ok(Self {
            client: http::build_client(NAME, Duration::from_secs(60))?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Create a provider using `EXA_API_KEY`.
    pub fn from_env() -> Result<Self, SearchError> {
        Self::new(http::api_key_from_env(NAME, EXA_API_KEY_ENV)?)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Parsed Exa options.
#[derive(Debug, Clone, PartialEq)]
struct ExaParams {
    max_characters: Option<u64>,
    num_results: u64,
    include_domains: Option<Vec<String>>,
    exclude_domains: Option<Vec<String>>,
    subpages: Option<u64>,
}

impl ExaParams {
    fn from_options(options: &SearchOptions) -> Result<Self, SearchError> {
        let params = Self {
            max_characters: params::u64_opt(NAME, options, "max_characters")?,
            num_results: params::u64_opt(NAME, options, "num_results")?.unwrap_or(5),
            include_domains: params::str_list_opt(NAME, options, "include_domains")?,
            exclude_domains: params::str_list_opt(NAME, options, "exclude_domains")?,
            subpages: params::u64_opt(NAME, options, "subpages")?,
        };
        if params.include_domains.is_some() && params.exclude_domains.is_some() {
            return Err(SearchError::InvalidOptions {
                provider: NAME.to_string(),
                reason: "Cannot specify both include_domains and exclude_domains".to_string(),
            });
        }
        Ok(params)
    }

    fn request_body(&self, query: &str) -> Value {
        let text = match self.max_characters {
            Some(max) => json!({ "maxCharacters": max }),
            None => json!(true),
        };
        let mut contents = Map::new();
        contents.insert("text".into(), text);
        contents.insert("summary".into(), json!(true));
        if let Some(subpages) = self.subpages {
            contents.insert("subpages".into(), json!(subpages));
        }

        let mut body = json!({
            "query": query,
            "numResults": self.num_results,
            "contents": contents,
        });
        if let Some(domains) = &self.include_domains {
            body["includeDomains"] = json!(domains);
        } else if let Some(domains) = &self.exclude_domains {
            body["excludeDomains"] = json!(domains);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
struct ExaResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    subpages: Vec<ExaResult>,
}

impl ExaResult {
    /// Summary first, then the text, separated by a blank line.
    fn record(&self) -> SourceRecord {
        let text = self.text.clone().unwrap_or_default();
        let content = match self.summary.as_deref().filter(|s| !s.is_empty()) {
            Some(summary) if !text.is_empty() => format!("{summary}\n\n{text}"),
            Some(summary) => summary.to_string(),
            None => text.clone(),
        };
        let record = SourceRecord::new(
            self.title.clone().unwrap_or_default(),
            self.url.clone(),
            content,
            self.score.unwrap_or(0.0),
        );
        if text.is_empty() {
            record
        } else {
            record.with_raw_content(text)
        }
    }
}

impl ExaResponse {
    /// Main results first, then subpages when requested. Repeated URLs are skipped.
    fn into_records(self, include_subpages: bool) -> Vec<SourceRecord> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for result in &self.results {
            if seen.insert(result.url.clone()) {
                records.push(result.record());
            }
        }
        if include_subpages {
            for subpage in self.results.iter().flat_map(|r| r.subpages.iter()) {
                if seen.insert(subpage.url.clone()) {
                    records.push(subpage.record().with_metadata("subpage", true));
                }
            }
        }
        records
    }
}

#[async_trait]
impl SearchProvider for ExaProvider {
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
        let params = ExaParams::from_options(options)?;
        debug!(query, num_results = params.num_results, "Exa search");

        let request = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&params.request_body(query));
        let response: ExaResponse = http::send_json(NAME, request).await?;
        Ok(response.into_records(params.subpages.is_some()))
    }

    async fn search_all(
        &self,
        queries: &[String],
        options: &SearchOptions,
    ) -> Option<Vec<QueryOutcome>> {
        let mut outcomes = Vec::with_capacity(queries.len());
        for (i, query) in queries.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(REQUEST_GAP).await;
            }
            match self.search(query, options).await {
                Ok(results) => outcomes.push(QueryOutcome::success(query.clone(), results)),
                Err(e) => {
                    if http::is_rate_limited(&e) {
                        warn!(query = %query, "Exa rate limit hit; backing off");
                        tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                    }
                    outcomes.push(QueryOutcome::failure(query.clone(), e));
                }
            }
        }
        Some(outcomes)
    }
}
