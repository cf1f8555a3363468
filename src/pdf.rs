//! PDF text extraction and title heuristics.
//!
//! Extraction never fails loudly: a missing file, an unparsable PDF, or a
//! panic inside the PDF library all come back as `None` with a warning.

use std::panic;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Number of leading non-empty lines considered by [`infer_title`]
const TITLE_CANDIDATE_LINES: usize = 5;

/// Lines containing any of these (case-insensitive) are never titles
const TITLE_STOP_WORDS: &[&str] = &["abstract", "introduction", "arxiv"];

/// Titles are at least this many characters long
const MIN_TITLE_CHARS: usize = 10;

/// A PDF loaded from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name without extension
    pub filename: String,
    pub text: String,
}

/// Extract the text of a PDF, or `None` if the file is missing or unreadable.
pub fn extract(path: &Path) -> Option<String> {
    if !path.exists() {
        warn!(path = ?path, "File not found");
        return None;
    }

    let owned = path.to_path_buf();
    let result = panic::catch_unwind(move || pdf_extract::extract_text(&owned));

    match result {
        Ok(Ok(text)) => {
            let text = text.trim().to_string();
            if text.is_empty() {
                warn!(path = ?path, "No text layer in PDF");
                None
            } else {
                debug!(path = ?path, chars = text.len(), "Extracted PDF text");
                Some(text)
            }
        }
        Ok(Err(e)) => {
            warn!(path = ?path, error = %e, "Failed to extract PDF text");
            None
        }
        Err(_) => {
            warn!(path = ?path, "PDF extraction panicked");
            None
        }
    }
}

/// Guess the title from the first few lines of extracted text.
///
/// Looks at the first five non-empty lines and returns the first one that is
/// not a section header, not too short, not an email/URL line, and not an
/// author list (more than two commas).
pub fn infer_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(TITLE_CANDIDATE_LINES)
        .find(|line| is_title_candidate(line))
        .map(str::to_string)
}

fn is_title_candidate(line: &str) -> bool {
    let lower = line.to_lowercase();
    if TITLE_STOP_WORDS.iter().any(|w| lower.contains(w)) {
        return false;
    }
    if line.chars().count() < MIN_TITLE_CHARS || line.contains('@') || line.contains("http") {
        return false;
    }
    line.matches(',').count() <= 2
}

/// Load every `*.pdf` in `folder`, sorted by file name.
///
/// Files whose text cannot be extracted are skipped.
pub fn load_folder(folder: &Path) -> Vec<Document> {
    if !folder.is_dir() {
        warn!(folder = ?folder, "Invalid folder path");
        return Vec::new();
    }

    let mut paths: Vec<PathBuf> = match std::fs::read_dir(folder) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            })
            .collect(),
        Err(e) => {
            warn!(folder = ?folder, error = %e, "Failed to read folder");
            return Vec::new();
        }
    };
    paths.sort();

    let documents: Vec<Document> = paths
        .iter()
        .filter_map(|path| {
            let text = extract(path)?;
            let filename = path.file_stem()?.to_string_lossy().into_owned();
            Some(Document { filename, text })
        })
        .collect();

    info!(folder = ?folder, found = paths.len(), loaded = documents.len(), "Loaded PDFs");
    documents
}

/// Split text into chunks of at most `max_words` whitespace-separated words.
pub fn split_words(text: &str, max_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(max_words.max(1))
        .map(|chunk| chunk.join(" "))
        .collect()
}
