//! Academic search over the OpenAlex works API.
//!
//! [`OpenAlexSearch`] fetches one page of results at a time. [`SearchCursor`]
//! turns any [`SearchBackend`] into a lazy result stream that requests the next
//! page only when the previous one is used up.
//!
//! API notes (per OpenAlex docs):
//! - A `mailto` parameter moves requests into the polite pool
//! - HTTP 429 is retried with exponential backoff

use crate::config::SearchSettings;
use crate::error::{ResearchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retries of a rate-limited request before giving up
const MAX_RETRIES: u32 = 3;

/// Fields requested from the works endpoint
const SELECT_FIELDS: &str = "id,display_name,title,publication_year,doi,abstract_inverted_index,authorships,primary_location,best_oa_location";

/// One search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    /// First three authors, comma separated
    pub authors: String,
    pub year: Option<i32>,
    pub venue: String,
    /// Bare DOI without the `https://doi.org/` prefix
    pub doi: String,
    pub article_url: String,
    /// Direct link to a PDF, when one is known
    pub pdf_url: Option<String>,
    pub abstract_text: String,
}

/// Source of search result pages.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Fetch page `page` (1-indexed). An empty page means no more results.
    async fn fetch_page(&self, query: &str, page: u32) -> Result<Vec<SearchResult>>;
}

/// Lazy stream of results over a [`SearchBackend`].
///
/// A page that fails is skipped. After `max_failures` consecutive failed pages,
/// or the first empty page, the stream is exhausted.
pub struct SearchCursor<'a, S: ?Sized> {
    backend: &'a S,
    query: String,
    page: u32,
    buffer: VecDeque<SearchResult>,
    failures: u32,
    max_failures: u32,
    exhausted: bool,
}

impl<'a, S> SearchCursor<'a, S>
where
    S: SearchBackend + ?Sized,
{
    pub fn new(backend: &'a S, query: &str, max_failures: u32) -> Self {
        Self {
            backend,
            query: query.to_string(),
            page: 0,
            buffer: VecDeque::new(),
            failures: 0,
            max_failures: max_failures.max(1),
            exhausted: false,
        }
    }

    /// Next result, or `None` once the stream is exhausted.
    pub async fn next(&mut self) -> Option<SearchResult> {
        loop {
            if let Some(result) = self.buffer.pop_front() {
                return Some(result);
            }
            if self.exhausted {
                return None;
            }

            self.page += 1;
            match self.backend.fetch_page(&self.query, self.page).await {
                Ok(results) if results.is_empty() => {
                    debug!(page = self.page, "No more search results");
                    self.exhausted = true;
                }
                Ok(results) => {
                    self.failures = 0;
                    self.buffer.extend(results);
                }
                Err(e) => {
                    self.failures += 1;
                    warn!(page = self.page, error = %e, failures = self.failures, "Failed to fetch search page");
                    if self.failures >= self.max_failures {
                        warn!(query = %self.query, "Too many failed pages, ending search");
                        self.exhausted = true;
                    }
                }
            }
        }
    }
}

/// OpenAlex API response structures
#[derive(Debug, Deserialize)]
struct OpenAlexResponse {
    results: Vec<OpenAlexWork>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    doi: Option<String>,
    #[serde(rename = "abstract_inverted_index")]
    abstract_index: Option<serde_json::Value>,
    authorships: Option<Vec<OpenAlexAuthorship>>,
    primary_location: Option<OpenAlexLocation>,
    best_oa_location: Option<OpenAlexLocation>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthorship {
    author: Option<OpenAlexAuthor>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexLocation {
    source: Option<OpenAlexSource>,
    landing_page_url: Option<String>,
    pdf_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexSource {
    display_name: Option<String>,
}

/// OpenAlex works search.
pub struct OpenAlexSearch {
    client: Client,
    settings: SearchSettings,
}

impl OpenAlexSearch {
    pub fn new(settings: SearchSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("rustresearcher/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, settings })
    }

    /// Build OpenAlex API search URL
    fn search_url(&self, query: &str, page: u32) -> String {
        let mut url = format!(
            "{}/works?search={}&per-page={}&page={}&select={}",
            self.settings.api_base.trim_end_matches('/'),
            urlencoding::encode(query),
            self.settings.per_page,
            page,
            SELECT_FIELDS
        );
        if let Some(mailto) = self.settings.mailto.as_deref().filter(|m| !m.is_empty()) {
            url.push_str(&format!("&mailto={}", urlencoding::encode(mailto)));
        }
        url
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let mut retries = 0;

        loop {
            let response = self.client.get(url).send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response.text().await?);
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if retries < MAX_RETRIES {
                    let backoff = Duration::from_secs(2u64.pow(retries));
                    warn!(
                        retries = retries,
                        backoff_secs = backoff.as_secs(),
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    retries += 1;
                    continue;
                }
                return Err(ResearchError::RateLimited(60));
            }

            return Err(ResearchError::Api {
                code: status.as_u16() as i32,
                message: format!("OpenAlex API error: {}", status),
            });
        }
    }
}

#[async_trait]
impl SearchBackend for OpenAlexSearch {
    async fn fetch_page(&self, query: &str, page: u32) -> Result<Vec<SearchResult>> {
        if page > 1 && self.settings.max_delay_ms > 0 {
            let delay = rand::random::<u64>() % self.settings.max_delay_ms;
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let url = self.search_url(query, page);
        debug!(url = %url, page = page, "Fetching OpenAlex page");
        let body = self.fetch(&url).await?;
        let results = parse_response(&body)?;
        info!(page = page, count = results.len(), "Parsed OpenAlex results");
        Ok(results)
    }
}

/// Parse OpenAlex API response
fn parse_response(json_str: &str) -> Result<Vec<SearchResult>> {
    let response: OpenAlexResponse = serde_json::from_str(json_str)
        .map_err(|e| ResearchError::Parse(format!("Failed to parse OpenAlex response: {}", e)))?;

    Ok(response
        .results
        .into_iter()
        .filter_map(convert_work)
        .collect())
}

fn convert_work(work: OpenAlexWork) -> Option<SearchResult> {
    let title = work
        .display_name
        .or(work.title)
        .filter(|t| !t.trim().is_empty())?;

    let mut result = SearchResult {
        title,
        year: work.publication_year,
        doi: work
            .doi
            .map(|d| d.replace("https://doi.org/", ""))
            .unwrap_or_default(),
        ..Default::default()
    };

    if let Some(authorships) = &work.authorships {
        let authors: Vec<&str> = authorships
            .iter()
            .take(3)
            .filter_map(|a| a.author.as_ref())
            .filter_map(|a| a.display_name.as_deref())
            .collect();
        result.authors = authors.join(", ");
        if authorships.len() > 3 {
            result.authors.push_str(" ...");
        }
    }

    if let Some(location) = &work.primary_location {
        result.venue = location
            .source
            .as_ref()
            .and_then(|s| s.display_name.clone())
            .unwrap_or_default();
        result.article_url = location.landing_page_url.clone().unwrap_or_default();
        result.pdf_url = location.pdf_url.clone();
    }

    if let Some(best_oa) = &work.best_oa_location {
        if result.pdf_url.is_none() {
            result.pdf_url = best_oa.pdf_url.clone();
        }
        if result.article_url.is_empty() {
            result.article_url = best_oa.landing_page_url.clone().unwrap_or_default();
        }
    }
    result.pdf_url = result.pdf_url.filter(|u| !u.trim().is_empty());

    if let Some(index) = &work.abstract_index {
        result.abstract_text = reconstruct_abstract(index);
    }

    Some(result)
}

/// Rebuild plain text from OpenAlex's inverted abstract index.
fn reconstruct_abstract(inverted_index: &serde_json::Value) -> String {
    let Some(obj) = inverted_index.as_object() else {
        return String::new();
    };

    let mut words: Vec<(i64, &str)> = obj
        .iter()
        .filter_map(|(word, positions)| Some((word, positions.as_array()?)))
        .flat_map(|(word, positions)| {
            positions
                .iter()
                .filter_map(|p| p.as_i64())
                .map(move |p| (p, word.as_str()))
        })
        .collect();

    words.sort_by_key(|(pos, _)| *pos);
    words.iter().map(|(_, w)| *w).collect::<Vec<_>>().join(" ")
}
