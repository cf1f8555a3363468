//! Search-driven discovery: search, screen abstracts, then read the related
//! papers in full.
//!
//! Papers read here are remembered in a read log keyed by PDF link, so later
//! searches never return them again. A research question can be explored over
//! several rounds of keywords, and papers can also be read from a CSV list or a
//! local PDF.

use crate::config::ReadingSettings;
use crate::download::{self, FullTextSource};
use crate::error::Result;
use crate::export::save_csv;
use crate::llm::{ChatBackend, Completion, TokenUsage};
use crate::pdf::split_words;
use crate::reader::{self, PaperSummary};
use crate::search::{SearchBackend, SearchCursor, SearchResult};
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Papers already read by the search flow, keyed by PDF link.
pub type ReadLog = RecordStore<ReadEntry>;

/// One entry of the read log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadEntry {
    pub title: String,
    /// RFC 3339 time the paper was summarized
    pub read_at: String,
    #[serde(default)]
    pub summary: Option<PaperSummary>,
}

/// A search result that passed through abstract screening.
#[derive(Debug, Clone)]
pub struct ScreenedPaper {
    pub result: SearchResult,
    /// Search phrase that found the paper
    pub keywords: String,
    pub pdf_url: String,
    /// One-sentence problem statement from the abstract
    pub summary: String,
    pub related: bool,
    pub text: String,
}

/// One row of `abstract_<keywords>_<stamp>.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbstractRow {
    pub keywords: String,
    pub title: String,
    pub authors: String,
    pub year: Option<i32>,
    pub venue: String,
    pub doi: String,
    pub pdf_url: String,
    pub summary: String,
    pub related: bool,
}

impl From<&ScreenedPaper> for AbstractRow {
    fn from(paper: &ScreenedPaper) -> Self {
        Self {
            keywords: paper.keywords.clone(),
            title: paper.result.title.clone(),
            authors: paper.result.authors.clone(),
            year: paper.result.year,
            venue: paper.result.venue.clone(),
            doi: paper.result.doi.clone(),
            pdf_url: paper.pdf_url.clone(),
            summary: paper.summary.clone(),
            related: paper.related,
        }
    }
}

/// One row of `summary_<keywords>_<stamp>.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub title: String,
    pub pdf_url: String,
    pub problem: String,
    pub method: String,
    pub difference: String,
    pub dataset: String,
}

impl SummaryRow {
    fn new(title: &str, pdf_url: &str, summary: PaperSummary) -> Self {
        Self {
            title: title.to_string(),
            pdf_url: pdf_url.to_string(),
            problem: summary.problem,
            method: summary.method,
            difference: summary.difference,
            dataset: summary.dataset,
        }
    }
}

/// One row of a paper list given to [`Discovery::summarize_list`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListedPaper {
    #[serde(rename = "Title", alias = "title")]
    pub title: String,
    #[serde(rename = "URL", alias = "url")]
    pub url: String,
}

/// Read a `Title`,`URL` CSV list.
pub fn read_paper_list(path: &Path) -> Result<Vec<ListedPaper>> {
    let mut reader = csv::Reader::from_path(path)?;
    let papers = reader.deserialize().collect::<std::result::Result<Vec<ListedPaper>, _>>()?;
    Ok(papers)
}

/// Search, screen and summarize against one chat model.
pub struct Discovery<'a> {
    chat: &'a dyn ChatBackend,
    search: &'a dyn SearchBackend,
    source: &'a dyn FullTextSource,
    read_log: &'a ReadLog,
    reading: ReadingSettings,
}

impl<'a> Discovery<'a> {
    pub fn new(
        chat: &'a dyn ChatBackend,
        search: &'a dyn SearchBackend,
        source: &'a dyn FullTextSource,
        read_log: &'a ReadLog,
        reading: ReadingSettings,
    ) -> Self {
        Self {
            chat,
            search,
            source,
            read_log,
            reading,
        }
    }

    /// Screen the first `count` unread results of `keywords` that have a
    /// readable PDF.
    ///
    /// At most `reading.max_results` search results are inspected.
    pub async fn screen(&self, keywords: &str, count: usize) -> Result<Completion<Vec<ScreenedPaper>>> {
        self.screen_with(keywords, count, &mut HashSet::new()).await
    }

    /// Explore `question` over up to `rounds` rounds of model-designed keywords.
    ///
    /// Every round asks for a query unlike the ones already used, then screens
    /// up to `count` papers that no earlier round returned.
    pub async fn explore(
        &self,
        question: &str,
        rounds: usize,
        count: usize,
    ) -> Result<Completion<Vec<ScreenedPaper>>> {
        let mut tried: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut screened = Vec::new();
        let mut usage = TokenUsage::default();

        for round in 1..=rounds {
            let keywords = match reader::design_search_keywords(self.chat, question, &tried).await {
                Ok(completion) => {
                    usage += completion.usage;
                    completion.value
                }
                Err(e) if e.is_storage_failure() => return Err(e),
                Err(e) => {
                    warn!(round = round, error = %e, "Error while designing search keywords");
                    break;
                }
            };
            if keywords.is_empty() || tried.contains(&keywords) {
                warn!(round = round, keywords = %keywords, "No new search keywords, stop exploring");
                break;
            }

            println!("\n--- Round {}: {} ---", round, keywords);
            let found = self.screen_with(&keywords, count, &mut seen).await?;
            usage += found.usage;
            screened.extend(found.value);
            tried.push(keywords);
        }

        info!(rounds = tried.len(), screened = screened.len(), "Exploration complete");
        Ok(Completion {
            value: screened,
            usage,
        })
    }

    /// Screening shared by single searches and exploration rounds; `seen`
    /// holds PDF links already returned in this run.
    async fn screen_with(
        &self,
        keywords: &str,
        count: usize,
        seen: &mut HashSet<String>,
    ) -> Result<Completion<Vec<ScreenedPaper>>> {
        let read_titles = self.read_titles()?;

        let mut cursor = SearchCursor::new(self.search, keywords, self.reading.max_page_failures);
        let mut screened = Vec::new();
        let mut usage = TokenUsage::default();
        let mut inspected = 0;

        while screened.len() < count && inspected < self.reading.max_results {
            let Some(result) = cursor.next().await else {
                break;
            };
            inspected += 1;

            let Some(pdf_url) = result.pdf_url.clone() else {
                continue;
            };
            if seen.contains(&pdf_url) {
                continue;
            }
            if self.read_log.contains(&pdf_url)? || read_titles.contains(&result.title) {
                println!("⏭️  Already read: {}", result.title);
                continue;
            }
            seen.insert(pdf_url.clone());

            let text = match self.source.full_text(&result).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(url = %pdf_url, error = %e, "Error while getting abstract");
                    continue;
                }
            };
            let Some(abstract_text) = split_words(&text, self.reading.abstract_words).into_iter().next() else {
                continue;
            };

            match reader::screen_abstract(self.chat, &abstract_text, keywords).await {
                Ok(completion) => {
                    usage += completion.usage;
                    let mark = if completion.value.related { "✅" } else { "➖" };
                    println!("{} [{}] {}", mark, screened.len() + 1, result.title);
                    screened.push(ScreenedPaper {
                        result,
                        keywords: keywords.to_string(),
                        pdf_url,
                        summary: completion.value.summary,
                        related: completion.value.related,
                        text,
                    });
                }
                Err(e) if e.is_storage_failure() => return Err(e),
                Err(e) => warn!(title = %result.title, error = %e, "Error while screening abstract"),
            }
        }

        info!(keywords = keywords, inspected = inspected, screened = screened.len(), "Screening complete");
        Ok(Completion {
            value: screened,
            usage,
        })
    }

    fn read_titles(&self) -> Result<Vec<String>> {
        Ok(self
            .read_log
            .list()?
            .into_values()
            .map(|entry| entry.title)
            .collect())
    }

    /// Read every related paper in full and record it in the read log.
    pub async fn summarize(&self, screened: &[ScreenedPaper]) -> Result<Completion<Vec<SummaryRow>>> {
        let mut rows = Vec::new();
        let mut usage = TokenUsage::default();

        for paper in screened.iter().filter(|p| p.related) {
            println!("📖 Reading: {}", paper.result.title);
            let chunks = split_words(&paper.text, self.reading.chunk_words);

            let summary = match reader::summarize_paper(self.chat, &chunks, self.reading.max_chunks).await {
                Ok(completion) => {
                    usage += completion.usage;
                    completion.value
                }
                Err(e) if e.is_storage_failure() => return Err(e),
                Err(e) => {
                    warn!(title = %paper.result.title, error = %e, "Error while summarizing paper");
                    continue;
                }
            };

            self.log_read(&paper.pdf_url, &paper.result.title, &summary)?;
            rows.push(SummaryRow::new(&paper.result.title, &paper.pdf_url, summary));
        }

        Ok(Completion { value: rows, usage })
    }

    /// Download and summarize every unread paper of a list.
    ///
    /// Rows whose title or link is in the read log are skipped. A paper that
    /// cannot be fetched or read gets a row with an empty summary and stays
    /// out of the read log, so a later run retries it.
    pub async fn summarize_list(&self, papers: &[ListedPaper]) -> Result<Completion<Vec<SummaryRow>>> {
        let read_titles = self.read_titles()?;
        let mut rows = Vec::new();
        let mut usage = TokenUsage::default();

        for paper in papers {
            if self.read_log.contains(&paper.url)? || read_titles.contains(&paper.title) {
                println!("⏭️  Already read: {}", paper.title);
                continue;
            }
            println!("📖 Reading: {}", paper.title);

            let result = SearchResult {
                title: paper.title.clone(),
                pdf_url: Some(paper.url.clone()),
                ..Default::default()
            };
            let summary = match self.read_full_text(&result).await {
                Ok(completion) => {
                    usage += completion.usage;
                    completion.value
                }
                Err(e) if e.is_storage_failure() => return Err(e),
                Err(e) => {
                    warn!(title = %paper.title, error = %e, "Error while reading listed paper");
                    rows.push(SummaryRow::new(&paper.title, &paper.url, PaperSummary::default()));
                    continue;
                }
            };

            self.log_read(&paper.url, &paper.title, &summary)?;
            rows.push(SummaryRow::new(&paper.title, &paper.url, summary));
        }

        Ok(Completion { value: rows, usage })
    }

    async fn read_full_text(&self, result: &SearchResult) -> Result<Completion<PaperSummary>> {
        let text = self.source.full_text(result).await?;
        let chunks = split_words(&text, self.reading.chunk_words);
        reader::summarize_paper(self.chat, &chunks, self.reading.max_chunks).await
    }

    fn log_read(&self, pdf_url: &str, title: &str, summary: &PaperSummary) -> Result<()> {
        self.read_log.put(
            pdf_url,
            &ReadEntry {
                title: title.to_string(),
                read_at: chrono::Local::now().to_rfc3339(),
                summary: Some(summary.clone()),
            },
        )
    }
}

/// Summarize one local PDF without touching the read log.
pub async fn summarize_local(
    chat: &dyn ChatBackend,
    path: &Path,
    reading: &ReadingSettings,
) -> Result<Completion<PaperSummary>> {
    let text = download::extract_blocking(path.to_path_buf()).await?;
    let chunks = split_words(&text, reading.chunk_words);
    reader::summarize_paper(chat, &chunks, reading.max_chunks).await
}

/// `"landslide detection"` becomes `"LandslideDetection"`.
pub fn keyword_slug(keywords: &str) -> String {
    keywords
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// File name part for a search phrase; `"Untitled"` when nothing is left.
pub fn export_slug(keywords: &str) -> String {
    let slug = keyword_slug(keywords);
    if slug.is_empty() {
        "Untitled".to_string()
    } else {
        slug
    }
}

/// Files written by [`write_discovery_exports`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoveryExports {
    pub abstracts: Option<PathBuf>,
    pub summaries: Option<PathBuf>,
}

/// Write the screening and summary tables of one search.
pub fn write_discovery_exports(
    csv_dir: &Path,
    keywords: &str,
    stamp: &str,
    screened: &[ScreenedPaper],
    summaries: &[SummaryRow],
) -> Result<DiscoveryExports> {
    let slug = export_slug(keywords);
    let abstracts_path = csv_dir.join(format!("abstract_{}_{}.csv", slug, stamp));
    let summaries_path = csv_dir.join(format!("summary_{}_{}.csv", slug, stamp));

    let rows: Vec<AbstractRow> = screened.iter().map(AbstractRow::from).collect();
    Ok(DiscoveryExports {
        abstracts: save_csv(&abstracts_path, &rows)?.then_some(abstracts_path),
        summaries: save_csv(&summaries_path, summaries)?.then_some(summaries_path),
    })
}
