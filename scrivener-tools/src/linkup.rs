//! Linkup web search provider.

use crate::{http, params, rank_score};
use async_trait::async_trait;
use scrivener_core::error::SearchError;
use scrivener_core::search::{SearchOptions, SearchProvider, SourceRecord};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const LINKUP_API_KEY_ENV: &str = "LINKUP_API_KEY";

const NAME: &str = "linkup";
const DEFAULT_BASE_URL: &str = "https://api.linkup.so/v1";
const ACCEPTED_OPTIONS: &[&str] = &["depth"];
const DEPTHS: &[&str] = &["standard", "deep"];

pub struct LinkupProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl LinkupProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SearchError> {
        Ok(Self {
            // Deep searches can take close to a minute
            client: http::build_client(NAME, Duration::from_secs(90))?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Create a provider using `LINKUP_API_KEY`.
    pub fn from_env() -> Result<Self, SearchError> {
        Self::new(http::api_key_from_env(NAME, LINKUP_API_KEY_ENV)?)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct LinkupRequest<'a> {
    q: &'a str,
    depth: &'a str,
    output_type: &'static str,
}

fn request<'a>(query: &'a str, options: &'a SearchOptions) -> Result<LinkupRequest<'a>, SearchError> {
    let depth = params::str_opt(NAME, options, "depth")?.unwrap_or("standard");
    if !DEPTHS.contains(&depth) {
        return Err(SearchError::InvalidOptions {
            provider: NAME.to_string(),
            reason: format!("`depth` must be one of {}, got \"{depth}\"", DEPTHS.join(", ")),
        });
    }
    Ok(LinkupRequest {
        q: query,
        depth,
        output_type: "searchResults",
    })
}

#[derive(Debug, Deserialize)]
struct LinkupResponse {
    #[serde(default)]
    results: Vec<LinkupResult>,
}

#[derive(Debug, Deserialize)]
struct LinkupResult {
    #[serde(default)]
    name: String,
    url: String,
    #[serde(default)]
    content: String,
}

impl LinkupResponse {
    /// Linkup returns no relevance scores, so records are scored by rank.
    fn into_records(self) -> Vec<SourceRecord> {
        let total = self.results.len();
        self.results
            .into_iter()
            .enumerate()
            .map(|(rank, r)| SourceRecord::new(r.name, r.url, r.content, rank_score(rank, total)))
            .collect()
    }
}

#[async_trait]
impl SearchProvider for LinkupProvider {
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
        let body = request(query, options)?;
        debug!(query, depth = body.depth, "Linkup search");
        let request = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let response: LinkupResponse = http::send_json(NAME, request).await?;
        Ok(response.into_records())
    }
}
