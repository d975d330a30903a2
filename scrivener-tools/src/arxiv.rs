//! arXiv search over the public Atom API.
//!
//! arXiv asks clients to wait three seconds between requests, so every call
//! goes through a shared rate gate and batches run sequentially.

use crate::{http, params, rank_score, xml};
use async_trait::async_trait;
use scrivener_core::error::SearchError;
use scrivener_core::search::{
    QueryOutcome, SearchOptions, SearchProvider, SourceRecord, SourceType,
};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const NAME: &str = "arxiv";
const DEFAULT_BASE_URL: &str = "https://export.arxiv.org/api/query";
const ACCEPTED_OPTIONS: &[&str] = &["load_max_docs", "get_full_documents", "load_all_available_meta"];
const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(3);
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);

/// Keyless academic search.
pub struct ArxivProvider {
    client: reqwest::Client,
    base_url: String,
    last_request: Mutex<Option<Instant>>,
}

impl ArxivProvider {
    pub fn new() -> Result<Self, SearchError> {
        Ok(Self {
            client: http::build_client(NAME, Duration::from_secs(30))?,
            base_url: DEFAULT_BASE_URL.to_string(),
            last_request: Mutex::new(None),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sleep until at least `MIN_REQUEST_INTERVAL` has passed since the last request.
    async fn rate_limit(&self) {
        let wait = {
            let last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
            (*last).and_then(|at| MIN_REQUEST_INTERVAL.checked_sub(at.elapsed()))
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    fn search_url(&self, query: &str, max_results: u64) -> String {
        format!(
            "{}?search_query={}&start=0&max_results={}",
            self.base_url,
            urlencoding::encode(&format!("all:{query}")),
            max_results
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct ArxivParams {
    max_docs: u64,
    full_documents: bool,
    all_meta: bool,
}

impl ArxivParams {
    fn from_options(options: &SearchOptions) -> Result<Self, SearchError> {
        Ok(Self {
            max_docs: params::u64_opt(NAME, options, "load_max_docs")?.unwrap_or(5),
            full_documents: params::bool_opt(NAME, options, "get_full_documents")?.unwrap_or(true),
            all_meta: params::bool_opt(NAME, options, "load_all_available_meta")?.unwrap_or(true),
        })
    }
}

#[derive(Debug, Default, PartialEq)]
struct Paper {
    entry_id: String,
    title: String,
    authors: Vec<String>,
    summary: String,
    published: String,
    primary_category: Option<String>,
    categories: Vec<String>,
    comment: Option<String>,
    journal_ref: Option<String>,
    doi: Option<String>,
    pdf_url: Option<String>,
}

fn parse_feed(body: &str) -> Vec<Paper> {
    xml::elements(body, "entry")
        .into_iter()
        .filter_map(|entry| parse_entry(entry.inner))
        .collect()
}

fn parse_entry(entry: &str) -> Option<Paper> {
    let entry_id = xml::first_text(entry, "id")?;
    let authors = xml::elements(entry, "author")
        .iter()
        .filter_map(|author| xml::first_text(author.inner, "name"))
        .collect();
    let categories = xml::elements(entry, "category")
        .iter()
        .filter_map(|c| c.attr("term").map(str::to_string))
        .collect();
    let pdf_url = xml::elements(entry, "link")
        .iter()
        .find(|l| l.attr("title") == Some("pdf") || l.attr("type") == Some("application/pdf"))
        .and_then(|l| l.attr("href"))
        .map(str::to_string);

    Some(Paper {
        title: xml::first_text(entry, "title").unwrap_or_default(),
        summary: xml::first_text(entry, "summary").unwrap_or_default(),
        published: xml::first_text(entry, "published").unwrap_or_default(),
        primary_category: xml::first(entry, "arxiv:primary_category")
            .and_then(|e| e.attr("term").map(str::to_string)),
        comment: xml::first_text(entry, "arxiv:comment"),
        journal_ref: xml::first_text(entry, "arxiv:journal_ref"),
        doi: xml::first_text(entry, "arxiv:doi"),
        entry_id,
        authors,
        categories,
        pdf_url,
    })
}

impl Paper {
    /// Summary and metadata, one `Label: value` line each.
    fn describe(&self, all_meta: bool) -> String {
        let mut lines = Vec::new();
        if !self.summary.is_empty() {
            lines.push(format!("Summary: {}", self.summary));
        }
        if !self.authors.is_empty() {
            lines.push(format!("Authors: {}", self.authors.join(", ")));
        }
        if !self.published.is_empty() {
            lines.push(format!("Published: {}", self.published));
        }
        if all_meta {
            let extra = [
                ("Primary Category", self.primary_category.clone()),
                (
                    "Categories",
                    Some(self.categories.join(", ")).filter(|c| !c.is_empty()),
                ),
                ("Comment", self.comment.clone()),
                ("Journal Reference", self.journal_ref.clone()),
                ("DOI", self.doi.clone()),
                ("PDF", self.pdf_url.clone()),
            ];
            for (label, value) in extra {
                if let Some(value) = value {
                    lines.push(format!("{label}: {value}"));
                }
            }
        }
        lines.join("\n")
    }
}

fn into_records(papers: Vec<Paper>, params: ArxivParams) -> Vec<SourceRecord> {
    let total = papers.len();
    papers
        .into_iter()
        .enumerate()
        .map(|(rank, paper)| {
            let content = paper.describe(params.all_meta);
            let mut record =
                SourceRecord::new(paper.title, paper.entry_id, content, rank_score(rank, total))
                    .with_source_type(SourceType::Academic);
            // PDF text is not extracted; the abstract stands in for the full document
            if params.full_documents && !paper.summary.is_empty() {
                record.raw_content = Some(paper.summary);
            }
            record
        })
        .collect()
}

#[async_trait]
impl SearchProvider for ArxivProvider {
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
        let params = ArxivParams::from_options(options)?;
        self.rate_limit().await;
        let url = self.search_url(query, params.max_docs);
        debug!(query, url = %url, "arXiv search");

        let body = http::send_text(NAME, self.client.get(&url)).await?;
        Ok(into_records(parse_feed(&body), params))
    }

    async fn search_all(
        &self,
        queries: &[String],
        options: &SearchOptions,
    ) -> Option<Vec<QueryOutcome>> {
        let mut outcomes = Vec::with_capacity(queries.len());
        for query in queries {
            match self.search(query, options).await {
                Ok(results) => outcomes.push(QueryOutcome::success(query.clone(), results)),
                Err(e) => {
                    if http::is_rate_limited(&e) {
                        warn!(query = %query, "arXiv rate limit hit; backing off");
                        tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                    }
                    outcomes.push(QueryOutcome::failure(query.clone(), e));
                }
            }
        }
        Some(outcomes)
    }
}
