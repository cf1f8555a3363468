//! Custom error types for rustresearcher.
//!
//! This module defines all error types used throughout the library.
//! All functions return `Result<T, ResearchError>` instead of using `unwrap()`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for rustresearcher operations.
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Model output did not match the requested output schema
    #[error("Schema violation ({schema}): {message}")]
    Schema {
        /// Name of the output schema that was requested
        schema: &'static str,
        /// What was wrong with the output
        message: String,
    },

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message from API
        message: String,
    },

    /// A record store document exists but cannot be decoded
    #[error("Corrupt record store {path:?}: {message}")]
    Store {
        /// Path of the backing document
        path: PathBuf,
        /// Decoder message
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV export error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ResearchError {
    /// Whether the error comes from local storage rather than a remote call.
    ///
    /// Batch flows skip the current item on remote failures but abort on these.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Io(_))
    }
}

/// Result type alias using `ResearchError`
pub type Result<T> = std::result::Result<T, ResearchError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ResearchError::Parse(msg.to_string()))
    }
}
