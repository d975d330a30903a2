//! PubMed search through NCBI E-utilities: `esearch` for ids, then one
//! `efetch` for the article records.

use crate::{http, params, rank_score, xml};
use async_trait::async_trait;
use scrivener_core::error::SearchError;
use scrivener_core::search::{
    QueryOutcome, SearchOptions, SearchProvider, SourceRecord, SourceType,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Optional key for NCBI's higher rate limit; the `api_key` option wins.
pub const NCBI_API_KEY_ENV: &str = "NCBI_API_KEY";

const NAME: &str = "pubmed";
const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const ACCEPTED_OPTIONS: &[&str] = &["top_k_results", "email", "api_key", "doc_content_chars_max"];

const INITIAL_GAP: Duration = Duration::from_millis(1000);
const MIN_GAP: Duration = Duration::from_millis(500);
const MAX_GAP: Duration = Duration::from_secs(5);

pub struct PubMedProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PubMedProvider {
    pub fn new() -> Result<Self, SearchError> {
        Ok(Self {
            client: http::build_client(NAME, Duration::from_secs(30))?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: http::api_key_from_env(NAME, NCBI_API_KEY_ENV).ok(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Shared query parameters: database plus optional contact and key.
    fn common_params(&self, params: &PubMedParams) -> Vec<(&'static str, String)> {
        let mut query = vec![("db", "pubmed".to_string())];
        if let Some(email) = &params.email {
            query.push(("email", email.clone()));
        }
        if let Some(key) = params.api_key.as_ref().or(self.api_key.as_ref()) {
            query.push(("api_key", key.clone()));
        }
        query
    }

    async fn search_ids(&self, query: &str, params: &PubMedParams) -> Result<Vec<String>, SearchError> {
        let mut query_params = self.common_params(params);
        query_params.extend([
            ("term", query.to_string()),
            ("retmode", "json".to_string()),
            ("retmax", params.top_k.to_string()),
            ("sort", "relevance".to_string()),
        ]);
        let request = self
            .client
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&query_params);
        let response: ESearchResponse = http::send_json(NAME, request).await?;
        Ok(response.esearchresult.idlist)
    }

    async fn fetch_articles(&self, ids: &[String], params: &PubMedParams) -> Result<String, SearchError> {
        let mut query_params = self.common_params(params);
        query_params.extend([("retmode", "xml".to_string()), ("id", ids.join(","))]);
        let request = self
            .client
            .get(format!("{}/efetch.fcgi", self.base_url))
            .query(&query_params);
        http::send_text(NAME, request).await
    }
}

#[derive(Debug, Clone)]
struct PubMedParams {
    top_k: u64,
    email: Option<String>,
    api_key: Option<String>,
    max_chars: usize,
}

impl PubMedParams {
    fn from_options(options: &SearchOptions) -> Result<Self, SearchError> {
        let max_chars = params::u64_opt(NAME, options, "doc_content_chars_max")?.unwrap_or(4000);
        Ok(Self {
            top_k: params::u64_opt(NAME, options, "top_k_results")?.unwrap_or(5),
            email: params::str_opt(NAME, options, "email")?
                .filter(|e| !e.trim().is_empty())
                .map(str::to_string),
            api_key: params::str_opt(NAME, options, "api_key")?
                .filter(|k| !k.trim().is_empty())
                .map(str::to_string),
            max_chars: usize::try_from(max_chars).unwrap_or(usize::MAX),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, PartialEq)]
struct Article {
    uid: String,
    title: String,
    published: Option<String>,
    copyright: Option<String>,
    summary: String,
}

fn parse_articles(body: &str, max_chars: usize) -> Vec<Article> {
    xml::elements(body, "PubmedArticle")
        .into_iter()
        .filter_map(|article| {
            let inner = article.inner;
            let uid = xml::first_text(inner, "PMID")?;
            let summary = xml::elements(inner, "AbstractText")
                .iter()
                .map(|part| part.text())
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            Some(Article {
                uid,
                title: xml::first_text(inner, "ArticleTitle").unwrap_or_default(),
                published: publication_date(inner),
                copyright: xml::first_text(inner, "CopyrightInformation"),
                summary: truncate_chars(&summary, max_chars),
            })
        })
        .collect()
}

/// `ArticleDate` when present, otherwise the journal's `PubDate`, as `Y-M-D`.
fn publication_date(article: &str) -> Option<String> {
    let date = xml::first(article, "ArticleDate").or_else(|| xml::first(article, "PubDate"))?;
    let parts: Vec<String> = ["Year", "Month", "Day"]
        .iter()
        .filter_map(|field| xml::first_text(date.inner, field))
        .collect();
    if parts.is_empty() {
        xml::first_text(date.inner, "MedlineDate")
    } else {
        Some(parts.join("-"))
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

fn into_records(articles: Vec<Article>) -> Vec<SourceRecord> {
    let total = articles.len();
    articles
        .into_iter()
        .enumerate()
        .map(|(rank, article)| {
            let mut lines = Vec::new();
            if let Some(published) = &article.published {
                lines.push(format!("Published: {published}"));
            }
            if let Some(copyright) = &article.copyright {
                lines.push(format!("Copyright Information: {copyright}"));
            }
            if !article.summary.is_empty() {
                lines.push(format!("Summary: {}", article.summary));
            }
            let url = format!("https://pubmed.ncbi.nlm.nih.gov/{}/", article.uid);
            let mut record =
                SourceRecord::new(article.title, url, lines.join("\n"), rank_score(rank, total))
                    .with_source_type(SourceType::Academic)
                    .with_metadata("pmid", article.uid);
            record.raw_content = Some(article.summary).filter(|s| !s.is_empty());
            record
        })
        .collect()
}

/// Next inter-request gap: shrink after a productive query, grow after a failure.
fn next_gap(gap: Duration, outcome: &QueryOutcome) -> Duration {
    if outcome.is_error() {
        (gap * 3 / 2).min(MAX_GAP)
    } else if !outcome.results.is_empty() {
        (gap * 9 / 10).max(MIN_GAP)
    } else {
        gap
    }
}

#[async_trait]
impl SearchProvider for PubMedProvider {
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
        let params = PubMedParams::from_options(options)?;
        let ids = self.search_ids(query, &params).await?;
        debug!(query, ids = ids.len(), "PubMed search");
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = self.fetch_articles(&ids, &params).await?;
        Ok(into_records(parse_articles(&body, params.max_chars)))
    }

    /// Sequential, with a gap that adapts to how NCBI is responding.
    async fn search_all(
        &self,
        queries: &[String],
        options: &SearchOptions,
    ) -> Option<Vec<QueryOutcome>> {
        let mut outcomes = Vec::with_capacity(queries.len());
        let mut gap = INITIAL_GAP;
        for (i, query) in queries.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(gap).await;
            }
            let outcome = match self.search(query, options).await {
                Ok(results) => QueryOutcome::success(query.clone(), results),
                Err(e) => {
                    warn!(query = %query, error = %e, "PubMed query failed");
                    QueryOutcome::failure(query.clone(), e)
                }
            };
            gap = next_gap(gap, &outcome);
            outcomes.push(outcome);
        }
        Some(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const EFETCH: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
<PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
    <PMID Version="1">31234567</PMID>
    <Article PubModel="Print">
      <Journal><JournalIssue><PubDate><Year>2019</Year><Month>Jun</Month></PubDate></JournalIssue></Journal>
      <ArticleTitle>Bone mineral density in older adults.</ArticleTitle>
      <Abstract>
        <AbstractText Label="BACKGROUND">Low BMD predicts <i>fracture</i>.</AbstractText>
        <AbstractText Label="RESULTS">DXA remains the reference.</AbstractText>
        <CopyrightInformation>&#169; 2019 Authors</CopyrightInformation>
      </Abstract>
      <ArticleDate DateType="Electronic"><Year>2019</Year><Month>05</Month><Day>14</Day></ArticleDate>
    </Article>
  </MedlineCitation>
</PubmedArticle>
<PubmedArticle>
  <MedlineCitation>
    <PMID Version="1">30000001</PMID>
    <Article>
      <Journal><JournalIssue><PubDate><MedlineDate>2018 Jan-Feb</MedlineDate></PubDate></JournalIssue></Journal>
      <ArticleTitle>Osteoporosis screening.</ArticleTitle>
    </Article>
  </MedlineCitation>
</PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_articles() {
        let articles = parse_articles(EFETCH, 4000);
        assert_eq!(articles.len(), 2);
        assert_eq!(
            articles[0],
            Article {
                uid: "31234567".into(),
                title: "Bone mineral density in older adults.".into(),
                published: Some("2019-05-14".into()),
                copyright: Some("&#169; 2019 Authors".into()),
                summary: "Low BMD predicts fracture .\nDXA remains the reference.".into(),
            }
        );
        assert_eq!(articles[1].published.as_deref(), Some("2018 Jan-Feb"));
        assert_eq!(articles[1].summary, "");
    }

    #[test]
    fn test_summary_truncation() {
        let articles = parse_articles(EFETCH, 7);
        assert_eq!(articles[0].summary, "Low BMD");
    }

    #[test]
    fn test_records() {
        let records = into_records(parse_articles(EFETCH, 4000));
        assert_eq!(records[0].url, "https://pubmed.ncbi.nlm.nih.gov/31234567/");
        assert_eq!(records[0].source_type, SourceType::Academic);
        assert!(records[0].content.starts_with("Published: 2019-05-14\nCopyright Information:"));
        assert!(records[0].raw_content.is_some());
        assert!(records[0].score > records[1].score);
        assert_eq!(records[1].raw_content, None);
        assert_eq!(records[1].content, "Published: 2018 Jan-Feb");
    }

    #[test]
    fn test_esearch_response() {
        let response: ESearchResponse = serde_json::from_value(json!({
            "header": {"type": "esearch"},
            "esearchresult": {"count": "2", "idlist": ["31234567", "30000001"]}
        }))
        .unwrap();
        assert_eq!(response.esearchresult.idlist, vec!["31234567", "30000001"]);
    }

    #[test]
    fn test_options() {
        let options = json!({"top_k_results": 2, "email": "a@b.org", "api_key": ""})
            .as_object()
            .cloned()
            .unwrap();
        let params = PubMedParams::from_options(&options).unwrap();
        assert_eq!(params.top_k, 2);
        assert_eq!(params.email.as_deref(), Some("a@b.org"));
        assert_eq!(params.api_key, None);
        assert_eq!(params.max_chars, 4000);
    }

    #[test]
    fn test_gap_adapts() {
        let hit = QueryOutcome::success("q", vec![SourceRecord::new("t", "u", "c", 1.0)]);
        let miss = QueryOutcome::success("q", Vec::new());
        let failed = QueryOutcome::failure("q", "boom");
        assert_eq!(next_gap(INITIAL_GAP, &hit), Duration::from_millis(900));
        assert_eq!(next_gap(MIN_GAP, &hit), MIN_GAP);
        assert_eq!(next_gap(INITIAL_GAP, &miss), INITIAL_GAP);
        assert_eq!(next_gap(INITIAL_GAP, &failed), Duration::from_millis(1500));
        assert_eq!(next_gap(Duration::from_secs(4), &failed), MAX_GAP);
    }
}
