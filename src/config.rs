//! Runtime settings.
//!
//! Settings come from a JSON file (`--config`, or `~/.rustresearcher.json`
//! when present), then `LLM_*` environment variables, then CLI flags applied by
//! the binary. Every field has a default, so an empty or missing file is fine.

use crate::error::{ResearchError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default settings file: `~/.rustresearcher.json`
pub fn default_config_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".rustresearcher.json"))
        .ok_or_else(|| ResearchError::Config("Cannot determine home directory".to_string()))
}

/// All settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub paths: PathSettings,
    pub reading: ReadingSettings,
    pub search: SearchSettings,
}

/// Chat model endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// OpenAI-compatible base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Not needed for a local Ollama server
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "llama3.1".to_string(),
            temperature: 0.0,
            timeout_secs: 300,
        }
    }
}

/// Where stores, inputs and exports live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub paper_db: PathBuf,
    pub topic_db: PathBuf,
    /// Papers already read by the search flow
    pub read_log: PathBuf,
    /// Folder scanned by `intake`
    pub pdf_folder: PathBuf,
    /// Where the search flow downloads PDFs
    pub download_dir: PathBuf,
    pub summary_output: PathBuf,
    pub topic_analysis: PathBuf,
    /// Exports of the search flow
    pub csv_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            paper_db: PathBuf::from("papers.json"),
            topic_db: PathBuf::from("topics.json"),
            read_log: PathBuf::from("read_papers.json"),
            pdf_folder: PathBuf::from("pdfs_folder"),
            download_dir: PathBuf::from("pdfs"),
            summary_output: PathBuf::from("summary_output"),
            topic_analysis: PathBuf::from("topic_analysis"),
            csv_dir: PathBuf::from("csv"),
        }
    }
}

/// Limits for the search-driven flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingSettings {
    /// Leading words treated as the abstract when screening
    pub abstract_words: usize,
    /// Words per chunk when reading a full paper
    pub chunk_words: usize,
    /// Hard ceiling on chunks read per paper
    pub max_chunks: usize,
    /// Search results inspected before giving up on finding PDFs
    pub max_results: usize,
    /// Consecutive failed search pages before the result stream ends
    pub max_page_failures: u32,
}

impl Default for ReadingSettings {
    fn default() -> Self {
        Self {
            abstract_words: 500,
            chunk_words: 1000,
            max_chunks: 20,
            max_results: 1000,
            max_page_failures: 3,
        }
    }
}

/// OpenAlex client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub api_base: String,
    /// Contact address for OpenAlex's polite pool
    pub mailto: Option<String>,
    pub per_page: usize,
    pub timeout_secs: u64,
    /// Upper bound of the random pause between page requests
    pub max_delay_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.openalex.org".to_string(),
            mailto: None,
            per_page: 25,
            timeout_secs: 30,
            max_delay_ms: 1000,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default file if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Ok(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No settings file, using defaults");
                    Self::default()
                }
            },
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ResearchError::Config(format!("Cannot read {:?}: {}", path, e)))?;
        let settings = serde_json::from_str(&content)
            .map_err(|e| ResearchError::Config(format!("Invalid settings in {:?}: {}", path, e)))?;
        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Apply `LLM_API_KEY`, `LLM_BASE_URL` and `LLM_MODEL` overrides.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("LLM_API_KEY").filter(|v| !v.is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = var("LLM_BASE_URL").filter(|v| !v.is_empty()) {
            self.llm.base_url = url;
        }
        if let Some(model) = var("LLM_MODEL").filter(|v| !v.is_empty()) {
            self.llm.model = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.llm.base_url.trim().is_empty() {
            return Err(ResearchError::Config("llm.base_url is empty".to_string()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ResearchError::Config("llm.model is empty".to_string()));
        }
        if self.reading.chunk_words == 0 || self.reading.abstract_words == 0 {
            return Err(ResearchError::Config(
                "reading.chunk_words and reading.abstract_words must be positive".to_string(),
            ));
        }
        if self.search.per_page == 0 || self.search.per_page > 200 {
            return Err(ResearchError::Config("search.per_page must be between 1 and 200".to_string()));
        }
        if self.reading.max_chunks == 0 {
            return Err(ResearchError::Config("reading.max_chunks must be positive".to_string()));
        }
        Ok(())
    }
}
