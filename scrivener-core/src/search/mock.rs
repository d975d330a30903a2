//! In-memory search provider for tests and offline runs.

use super::{QueryOutcome, SearchOptions, SearchProvider, SourceRecord};
use crate::error::SearchError;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type ResultFn =
    dyn Fn(&str, &SearchOptions) -> Result<Vec<SourceRecord>, SearchError> + Send + Sync;
type DelayFn = dyn Fn(&str) -> Duration + Send + Sync;

/// A mock search provider.
///
/// Returns one synthetic record per query unless a result closure is set.
/// A delay closure can hold individual queries back so tests control which
/// concurrent task finishes first.
pub struct MockSearchProvider {
    name: String,
    accepted: Vec<&'static str>,
    results: Option<Box<ResultFn>>,
    delay: Option<Box<DelayFn>>,
    native_batch: bool,
    calls: Mutex<Vec<(String, SearchOptions)>>,
    batch_calls: AtomicUsize,
}

impl MockSearchProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accepted: Vec::new(),
            results: None,
            delay: None,
            native_batch: false,
            calls: Mutex::new(Vec::new()),
            batch_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_accepted_options(mut self, keys: &[&'static str]) -> Self {
        self.accepted = keys.to_vec();
        self
    }

    pub fn with_results<F>(mut self, results: F) -> Self
    where
        F: Fn(&str, &SearchOptions) -> Result<Vec<SourceRecord>, SearchError>
            + Send
            + Sync
            + 'static,
    {
        self.results = Some(Box::new(results));
        self
    }

    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&str) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    /// Answer batches through `search_all` instead of per-query dispatch.
    pub fn with_native_batch(mut self) -> Self {
        self.native_batch = true;
        self
    }

    /// Every `(query, options)` pair received, in arrival order.
    pub fn calls(&self) -> Vec<(String, SearchOptions)> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn default_results(query: &str) -> Vec<SourceRecord> {
        vec![
            SourceRecord::new(
                format!("Result for {}", query),
                format!("https://search.example/?q={}", query.replace(' ', "+")),
                format!("Snippet about {}", query),
                0.5,
            )
            .with_raw_content(format!("Full text about {}", query)),
        ]
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepted_options(&self) -> &[&'static str] {
        &self.accepted
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SourceRecord>, SearchError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((query.to_string(), options.clone()));

        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(query)).await;
        }

        match &self.results {
            Some(results) => results(query, options),
            None => Ok(Self::default_results(query)),
        }
    }

    async fn search_all(
        &self,
        queries: &[String],
        options: &SearchOptions,
    ) -> Option<Vec<QueryOutcome>> {
        if !self.native_batch {
            return None;
        }
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        let mut outcomes = Vec::with_capacity(queries.len());
        for query in queries {
            outcomes.push(match self.search(query, options).await {
                Ok(results) => QueryOutcome::success(query.clone(), results),
                Err(e) => QueryOutcome::failure(query.clone(), e),
            });
        }
        Some(outcomes)
    }
}
