//! Persisted record types.
//!
//! A [`PaperRecord`] is the flattened union of a [`PaperAnalysis`] and, when the
//! paper was linked to a topic, a [`TopicConnection`]. A [`TopicRecord`] is the
//! hand-curated description of one research area.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured analysis of one paper, as returned by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperAnalysis {
    pub title: String,
    pub journal_conference: String,
    pub year: i32,
    #[serde(default)]
    pub url_or_doi: Option<String>,
    /// Empty, or a key of the topic store at the time of analysis
    #[serde(default)]
    pub main_topic: String,
    pub keywords: Vec<String>,
    pub methodology_innovation: String,
    pub dataset: String,
    pub evaluation_metrics: Vec<String>,
    pub summary: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
}

/// How a paper relates to its topic's history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicConnection {
    pub key_problem: String,
    /// Empty when no important paper of the topic is closely related
    #[serde(default)]
    pub related_paper: String,
    /// Empty iff `related_paper` is empty
    #[serde(default)]
    pub method_comparison: String,
    pub topic_advancement: String,
    /// Whether the paper deserves detailed manual reading
    pub important: bool,
}

impl TopicConnection {
    /// Clear `related_paper` unless it is one of `titles`, then keep
    /// `related_paper` and `method_comparison` both set or both empty.
    pub fn normalize_related(&mut self, titles: &[&str]) {
        let related = self.related_paper.trim();
        if !related.is_empty() && !titles.contains(&related) {
            tracing::debug!(related = %related, "Related paper is not an important paper of the topic");
            self.related_paper.clear();
        }
        if self.related_paper.trim().is_empty() || self.method_comparison.trim().is_empty() {
            self.related_paper.clear();
            self.method_comparison.clear();
        }
    }
}

/// One entry of the paper store, keyed by `analysis.title`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    #[serde(flatten)]
    pub analysis: PaperAnalysis,
    /// Present only when the paper's topic resolved and linking succeeded
    #[serde(flatten)]
    pub connection: Option<TopicConnection>,
}

impl PaperRecord {
    /// Build a record whose title is the store key.
    pub fn new(key: &str, mut analysis: PaperAnalysis, connection: Option<TopicConnection>) -> Self {
        analysis.title = key.to_string();
        Self { analysis, connection }
    }

    pub fn title(&self) -> &str {
        &self.analysis.title
    }

    pub fn is_important(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.important)
    }
}

/// A landmark paper of a topic.
///
/// On disk the list is either plain titles or `{title, summary}` objects; both
/// decode into this one shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ImportantPaperEntry", into = "ImportantPaperEntry")]
pub struct ImportantPaper {
    pub title: String,
    pub summary: Option<String>,
}

impl ImportantPaper {
    /// Bullet line used in prompts.
    pub fn bullet(&self) -> String {
        match self.summary.as_deref().map(str::trim) {
            Some(summary) if !summary.is_empty() => format!("- {}: {}", self.title, summary),
            _ => format!("- {}", self.title),
        }
    }
}

/// On-disk shapes accepted for an important paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportantPaperEntry {
    Title(String),
    Detailed {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
}

impl From<ImportantPaperEntry> for ImportantPaper {
    fn from(entry: ImportantPaperEntry) -> Self {
        match entry {
            ImportantPaperEntry::Title(title) => Self { title, summary: None },
            ImportantPaperEntry::Detailed { title, summary } => Self { title, summary },
        }
    }
}

impl From<ImportantPaper> for ImportantPaperEntry {
    fn from(paper: ImportantPaper) -> Self {
        match paper.summary {
            None => Self::Title(paper.title),
            Some(summary) => Self::Detailed { title: paper.title, summary: Some(summary) },
        }
    }
}

/// One entry of the topic store, keyed by topic name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub current_status: String,
    #[serde(default, alias = "challenges")]
    pub key_challenges: Vec<String>,
    #[serde(default)]
    pub important_papers: Vec<ImportantPaper>,
    /// Any other curated fields, kept as-is across re-saves
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TopicRecord {
    pub fn important_titles(&self) -> Vec<&str> {
        self.important_papers.iter().map(|p| p.title.as_str()).collect()
    }
}
