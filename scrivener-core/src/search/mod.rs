//! Search federation: normalized source records from pluggable providers.
//!
//! A [`SearchProvider`] turns a query string into [`SourceRecord`]s. The
//! [`ProviderRegistry`] maps provider names to implementations together with
//! the option keys each one accepts, and the [`SearchFederator`] dispatches a
//! batch of queries concurrently, isolates per-query failures, and
//! deduplicates the merged records by URL.

pub mod federator;
pub mod format;
pub mod mock;
pub mod registry;

pub use federator::{FederatedResults, QueryOutcome, SearchFederator};
pub use format::format_sources;
pub use mock::MockSearchProvider;
pub use registry::{ProviderRegistry, filter_options};

use crate::error::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Caller-supplied provider options. Shared across providers and filtered per provider.
pub type SearchOptions = Map<String, Value>;

/// What kind of source a record came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    Web,
    Academic,
    News,
    /// Answer engines that synthesize text and cite URLs (e.g. Perplexity).
    AnswerEngine,
    Other,
}

/// One normalized search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub title: String,
    pub url: String,
    /// Snippet or summary judged most relevant by the provider.
    pub content: String,
    /// Full page text, when the provider returns it.
    #[serde(default)]
    pub raw_content: Option<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SourceRecord {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            raw_content: None,
            score,
            source_type: SourceType::Web,
            metadata: Map::new(),
        }
    }

    pub fn with_raw_content(mut self, raw: impl Into<String>) -> Self {
        self.raw_content = Some(raw.into());
        self
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A single search query produced by query generation or grading.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    pub search_query: String,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            search_query: query.into(),
        }
    }
}

impl From<&str> for SearchQuery {
    fn from(query: &str) -> Self {
        Self::new(query)
    }
}

/// A pluggable search backend.
///
/// Providers should ignore option keys they do not understand; the federator
/// already filters options, but providers may also be called directly.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// The registry name of this provider (e.g. "tavily").
    fn name(&self) -> &str;

    /// Option keys this provider understands.
    fn accepted_options(&self) -> &[&'static str];

    /// Run one query.
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SourceRecord>, SearchError>;

    /// Run a whole batch natively.
    ///
    /// Returns `None` when the provider has no batch endpoint, in which case
    /// the federator issues one concurrent `search` per query. Implementations
    /// must report per-query failures inside the returned outcomes.
    async fn search_all(
        &self,
        _queries: &[String],
        _options: &SearchOptions,
    ) -> Option<Vec<QueryOutcome>> {
        None
    }
}

/// Keep one record per URL, preferring the highest score.
///
/// Ties keep the first record seen. Records with an empty URL are dropped.
/// The output preserves the order in which each URL was first seen.
pub fn dedupe_by_url(records: impl IntoIterator<Item = SourceRecord>) -> Vec<SourceRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<SourceRecord> = Vec::new();

    for record in records {
        let url = record.url.trim();
        if url.is_empty() {
            continue;
        }
        match index.get(url) {
            Some(&pos) => {
                if record.score > unique[pos].score {
                    unique[pos] = record;
                }
            }
            None => {
                index.insert(url.to_string(), unique.len());
                unique.push(record);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keeps_higher_score() {
        let records = vec![
            SourceRecord::new("low", "https://a.example", "x", 0.2),
            SourceRecord::new("b", "https://b.example", "y", 0.9),
            SourceRecord::new("high", "https://a.example", "z", 0.8),
        ];
        let unique = dedupe_by_url(records);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].title, "high");
        assert_eq!(unique[0].score, 0.8);
        assert_eq!(unique[1].url, "https://b.example");
    }

    #[test]
    fn test_dedupe_tie_keeps_first() {
        let records = vec![
            SourceRecord::new("first", "https://a.example", "", 0.5),
            SourceRecord::new("second", "https://a.example", "", 0.5),
        ];
        let unique = dedupe_by_url(records);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].title, "first");
    }

    #[test]
    fn test_dedupe_drops_empty_urls() {
        let records = vec![
            SourceRecord::new("blank", "", "", 1.0),
            SourceRecord::new("spaces", "   ", "", 1.0),
            SourceRecord::new("ok", "https://ok.example", "", 0.1),
        ];
        let unique = dedupe_by_url(records);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].title, "ok");
    }

    #[test]
    fn test_source_record_serde_defaults() {
        let record: SourceRecord =
            serde_json::from_str(r#"{"title":"t","url":"https://u","content":"c"}"#).unwrap();
        assert_eq!(record.score, 0.0);
        assert_eq!(record.raw_content, None);
        assert_eq!(record.source_type, SourceType::Web);
    }

    #[test]
    fn test_source_type_serde() {
        let json = serde_json::to_string(&SourceType::AnswerEngine).unwrap();
        assert_eq!(json, "\"answer_engine\"");
    }
}
