//! CSV exports of a run.
//!
//! List-valued fields are joined with `"; "` so every row stays flat.

use crate::error::Result;
use crate::records::{PaperAnalysis, TopicConnection};
use chrono::{DateTime, TimeZone};
use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::info;

/// Separator for list fields in CSV cells
const LIST_SEPARATOR: &str = "; ";

/// Timestamp embedded in export file names: `YYYYMMDD_HHMMSS`
pub fn run_stamp<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    time.format("%Y%m%d_%H%M%S").to_string()
}

/// One row of `paper_analyses_<stamp>.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRow {
    pub title: String,
    pub journal_conference: String,
    pub year: i32,
    pub url_or_doi: String,
    pub main_topic: String,
    pub keywords: String,
    pub methodology_innovation: String,
    pub dataset: String,
    pub evaluation_metrics: String,
    pub summary: String,
    pub pros: String,
    pub cons: String,
    pub filename: String,
}

impl AnalysisRow {
    pub fn new(analysis: &PaperAnalysis, filename: &str) -> Self {
        Self {
            title: analysis.title.clone(),
            journal_conference: analysis.journal_conference.clone(),
            year: analysis.year,
            url_or_doi: analysis.url_or_doi.clone().unwrap_or_default(),
            main_topic: analysis.main_topic.clone(),
            keywords: analysis.keywords.join(LIST_SEPARATOR),
            methodology_innovation: analysis.methodology_innovation.clone(),
            dataset: analysis.dataset.clone(),
            evaluation_metrics: analysis.evaluation_metrics.join(LIST_SEPARATOR),
            summary: analysis.summary.clone(),
            pros: analysis.pros.join(LIST_SEPARATOR),
            cons: analysis.cons.join(LIST_SEPARATOR),
            filename: filename.to_string(),
        }
    }
}

/// One row of `topic_connections_<stamp>.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRow {
    pub key_problem: String,
    pub related_paper: String,
    pub method_comparison: String,
    pub topic_advancement: String,
    pub important: bool,
    pub filename: String,
    pub title: String,
}

impl ConnectionRow {
    pub fn new(connection: &TopicConnection, filename: &str, title: &str) -> Self {
        Self {
            key_problem: connection.key_problem.clone(),
            related_paper: connection.related_paper.clone(),
            method_comparison: connection.method_comparison.clone(),
            topic_advancement: connection.topic_advancement.clone(),
            important: connection.important,
            filename: filename.to_string(),
            title: title.to_string(),
        }
    }
}

/// Files written by [`write_intake_exports`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub analyses: Option<PathBuf>,
    pub connections: Option<PathBuf>,
}

/// Write the analysis and connection exports of an intake run.
///
/// Each file is written only when it has at least one row.
pub fn write_intake_exports(
    analyses: &[AnalysisRow],
    connections: &[ConnectionRow],
    summary_dir: &Path,
    topic_dir: &Path,
    stamp: &str,
) -> Result<ExportPaths> {
    let analyses_path = summary_dir.join(format!("paper_analyses_{}.csv", stamp));
    let connections_path = topic_dir.join(format!("topic_connections_{}.csv", stamp));

    Ok(ExportPaths {
        analyses: save_csv(&analyses_path, analyses)?.then_some(analyses_path),
        connections: save_csv(&connections_path, connections)?.then_some(connections_path),
    })
}

/// Save rows to a CSV file, creating its directory.
///
/// Returns `false` without touching the filesystem when `data` is empty.
pub fn save_csv<T: Serialize>(path: &Path, data: &[T]) -> Result<bool> {
    if data.is_empty() {
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for item in data {
        wtr.serialize(item)?;
    }
    wtr.flush()?;

    info!(path = ?path, rows = data.len(), "Saved CSV");
    Ok(true)
}
