//! Concurrent dispatch of a query batch to one provider.

use super::{ProviderRegistry, SearchOptions, SourceRecord, dedupe_by_url, filter_options};
use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one query inside a federated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: String,
    pub results: Vec<SourceRecord>,
    /// Set when this query failed; `results` is then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn success(query: impl Into<String>, results: Vec<SourceRecord>) -> Self {
        Self {
            query: query.into(),
            results,
            error: None,
        }
    }

    pub fn failure(query: impl Into<String>, error: impl ToString) -> Self {
        Self {
            query: query.into(),
            results: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Everything a federated call produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FederatedResults {
    pub provider: String,
    /// One entry per query, in query order.
    pub outcomes: Vec<QueryOutcome>,
    /// All records merged and deduplicated by URL.
    pub sources: Vec<SourceRecord>,
}

impl FederatedResults {
    /// Queries that failed, with their error messages.
    pub fn failures(&self) -> impl Iterator<Item = &QueryOutcome> {
        self.outcomes.iter().filter(|o| o.is_error())
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Fans query batches out to registered providers.
#[derive(Clone)]
pub struct SearchFederator {
    registry: Arc<ProviderRegistry>,
}

impl SearchFederator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Run `queries` against `provider_name`.
    ///
    /// Fails only when the provider is not registered. Individual query
    /// failures are reported in [`FederatedResults::outcomes`] and never abort
    /// sibling queries.
    pub async fn federate(
        &self,
        provider_name: &str,
        queries: &[String],
        options: &SearchOptions,
    ) -> Result<FederatedResults, SearchError> {
        let provider = self.registry.get(provider_name)?;
        let filtered = filter_options(provider.accepted_options(), options);

        if queries.is_empty() {
            return Ok(FederatedResults {
                provider: provider_name.to_string(),
                ..Default::default()
            });
        }

        debug!(
            provider = provider_name,
            queries = queries.len(),
            options = ?filtered.keys().collect::<Vec<_>>(),
            "Federating search"
        );

        let outcomes = match provider.search_all(queries, &filtered).await {
            Some(outcomes) => outcomes,
            None => {
                let futures: Vec<_> = queries
                    .iter()
                    .map(|query| {
                        let provider = Arc::clone(&provider);
                        let filtered = &filtered;
                        async move {
                            debug!(provider = provider.name(), query = %query, "Dispatching query");
                            match provider.search(query, filtered).await {
                                Ok(results) => QueryOutcome::success(query.clone(), results),
                                Err(e) => QueryOutcome::failure(query.clone(), e),
                            }
                        }
                    })
                    .collect();
                futures::future::join_all(futures).await
            }
        };

        for failed in outcomes.iter().filter(|o| o.is_error()) {
            warn!(
                provider = provider_name,
                query = %failed.query,
                error = failed.error.as_deref().unwrap_or_default(),
                "Search query failed; continuing with remaining queries"
            );
        }

        let total: usize = outcomes.iter().map(|o| o.results.len()).sum();
        let sources = dedupe_by_url(outcomes.iter().flat_map(|o| o.results.iter().cloned()));
        info!(
            provider = provider_name,
            queries = queries.len(),
            raw_results = total,
            unique_sources = sources.len(),
            "Federated search complete"
        );

        Ok(FederatedResults {
            provider: provider_name.to_string(),
            outcomes,
            sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MockSearchProvider;
    use serde_json::json;

    fn federator_with(provider: MockSearchProvider) -> SearchFederator {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(provider)).unwrap();
        SearchFederator::new(Arc::new(registry))
    }

    fn queries(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_unsupported_provider_is_fatal() {
        let federator = federator_with(MockSearchProvider::new("mock"));
        let result = federator
            .federate("bing", &queries(&["q"]), &SearchOptions::new())
            .await;
        assert!(matches!(
            result,
            Err(SearchError::UnsupportedProvider { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_urls_keep_higher_score() {
        let provider = MockSearchProvider::new("mock").with_results(|_query, _opts| {
            Ok(vec![
                SourceRecord::new("weak", "https://same.example", "a", 0.3),
                SourceRecord::new("strong", "https://same.example", "b", 0.7),
            ])
        });
        let federator = federator_with(provider);
        let results = federator
            .federate("mock", &queries(&["one"]), &SearchOptions::new())
            .await
            .unwrap();
        assert_eq!(results.sources.len(), 1);
        assert_eq!(results.sources[0].title, "strong");
        assert_eq!(results.outcomes[0].results.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_query_is_isolated() {
        let provider = MockSearchProvider::new("mock").with_results(|query, _opts| {
            if query == "broken" {
                Err(SearchError::Request {
                    provider: "mock".into(),
                    message: "boom".into(),
                })
            } else {
                Ok(vec![SourceRecord::new(
                    query,
                    format!("https://{}.example", query),
                    "ok",
                    0.5,
                )])
            }
        });
        let federator = federator_with(provider);
        let results = federator
            .federate(
                "mock",
                &queries(&["alpha", "broken", "gamma"]),
                &SearchOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(results.outcomes.len(), 3);
        assert_eq!(results.outcomes[0].query, "alpha");
        assert!(!results.outcomes[0].is_error());
        assert!(results.outcomes[1].is_error());
        assert!(results.outcomes[1].results.is_empty());
        assert!(!results.outcomes[2].is_error());
        assert_eq!(results.failures().count(), 1);
        assert_eq!(results.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_options_are_filtered_before_dispatch() {
        let provider = MockSearchProvider::new("mock").with_accepted_options(&["max_results"]);
        let provider = Arc::new(provider);
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone()).unwrap();
        let federator = SearchFederator::new(Arc::new(registry));

        let opts = json!({"max_results": 2, "num_results": 8})
            .as_object()
            .cloned()
            .unwrap();
        federator
            .federate("mock", &queries(&["q"]), &opts)
            .await
            .unwrap();

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.len(), 1);
        assert_eq!(calls[0].1["max_results"], 2);
    }

    #[tokio::test]
    async fn test_native_batch_preferred() {
        let provider = Arc::new(MockSearchProvider::new("mock").with_native_batch());
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone()).unwrap();
        let federator = SearchFederator::new(Arc::new(registry));

        let results = federator
            .federate("mock", &queries(&["a", "b"]), &SearchOptions::new())
            .await
            .unwrap();
        assert_eq!(results.outcomes.len(), 2);
        assert_eq!(provider.batch_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_query_list() {
        let federator = federator_with(MockSearchProvider::new("mock"));
        let results = federator
            .federate("mock", &[], &SearchOptions::new())
            .await
            .unwrap();
        assert!(results.outcomes.is_empty());
        assert!(results.is_empty());
    }
}
