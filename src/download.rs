//! Full-text retrieval for search results.

use crate::error::{ResearchError, Result};
use crate::pdf;
use crate::search::SearchResult;
use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Timeout for one PDF download
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Source of the full text behind a search result.
#[async_trait]
pub trait FullTextSource: Send + Sync {
    async fn full_text(&self, result: &SearchResult) -> Result<String>;
}

/// Downloads PDFs into a directory and extracts their text.
///
/// A PDF already present under the same file name is reused without a request.
pub struct PdfDownloader {
    client: Client,
    dir: PathBuf,
}

impl PdfDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .user_agent(concat!("rustresearcher/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            dir: dir.into(),
        })
    }

    /// Download `pdf_url` unless it is already on disk. Returns the local path.
    pub async fn download(&self, pdf_url: &str) -> Result<PathBuf> {
        let path = self.dir.join(file_name_for(pdf_url)?);
        if path.exists() {
            debug!(path = ?path, "PDF already downloaded");
            return Ok(path);
        }

        let response = self.client.get(pdf_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResearchError::Api {
                code: status.as_u16() as i32,
                message: format!("PDF download failed: {}", status),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        let bytes = response.bytes().await?;
        if !looks_like_pdf(&content_type, &bytes) {
            return Err(ResearchError::Validation(format!(
                "{} is not a PDF (content-type: {})",
                pdf_url, content_type
            )));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, &bytes).await?;
        info!(url = pdf_url, path = ?path, bytes = bytes.len(), "Downloaded PDF");
        Ok(path)
    }
}

#[async_trait]
impl FullTextSource for PdfDownloader {
    async fn full_text(&self, result: &SearchResult) -> Result<String> {
        let pdf_url = result
            .pdf_url
            .as_deref()
            .ok_or_else(|| ResearchError::Validation(format!("No PDF link for {}", result.title)))?;
        let path = self.download(pdf_url).await?;
        extract_blocking(path).await
    }
}

/// Run the PDF extractor off the async runtime.
pub(crate) async fn extract_blocking(path: PathBuf) -> Result<String> {
    let shown = path.display().to_string();
    tokio::task::spawn_blocking(move || pdf::extract(&path))
        .await
        .ok()
        .flatten()
        .ok_or_else(|| ResearchError::Parse(format!("No text extracted from {}", shown)))
}

/// Longest readable stem kept in a local PDF file name
const MAX_STEM_CHARS: usize = 50;

/// Local file name for a PDF link.
///
/// The readable stem comes from the last path segment (or the host), and a
/// digest of the whole URL keeps links that differ only in their query or
/// directory apart, e.g. `pdf?id=A` and `pdf?id=B`.
pub fn file_name_for(pdf_url: &str) -> Result<String> {
    let url = Url::parse(pdf_url)
        .map_err(|e| ResearchError::Validation(format!("Invalid PDF URL {}: {}", pdf_url, e)))?;
    let segment = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
        .or_else(|| url.host_str().map(str::to_string))
        .ok_or_else(|| ResearchError::Validation(format!("Cannot name a file for {}", pdf_url)))?;

    let stem = match Path::new(&segment).extension() {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => &segment[..segment.len() - 4],
        _ => segment.as_str(),
    };
    let stem: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .take(MAX_STEM_CHARS)
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    Ok(format!("{}-{}.pdf", stem, &digest[..16]))
}

fn looks_like_pdf(content_type: &str, bytes: &[u8]) -> bool {
    content_type.contains("pdf") || bytes.starts_with(b"%PDF")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_for() -> Result<()> {
        let arxiv = file_name_for("https://arxiv.org/pdf/1706.03762v7.pdf")?;
        assert!(arxiv.starts_with("1706.03762v7-"));
        assert!(arxiv.ends_with(".pdf"));
        assert_eq!(arxiv.len(), "1706.03762v7-".len() + 16 + 4);
        assert!(file_name_for("https://arxiv.org/pdf/1706.03762v7")?.starts_with("1706.03762v7-"));
        assert!(file_name_for("https://example.org/files/My%20Paper.PDF?dl=1")?.starts_with("My_Paper-"));
        assert!(file_name_for("https://example.org/")?.starts_with("example.org-"));
        assert_eq!(file_name_for(&format!("https://example.org/{}", "x".repeat(200)))?.len(), 50 + 1 + 16 + 4);
        assert!(file_name_for("not a url").is_err());
        Ok(())
    }

    #[test]
    fn test_file_name_for_keeps_query_links_apart() -> Result<()> {
        let a = file_name_for("https://openreview.net/pdf?id=AAAA")?;
        let b = file_name_for("https://openreview.net/pdf?id=BBBB")?;
        assert_ne!(a, b);
        assert!(a.starts_with("pdf-") && b.starts_with("pdf-"));

        let one = file_name_for("https://a.org/v1/paper.pdf")?;
        let two = file_name_for("https://a.org/v2/paper.pdf")?;
        assert_ne!(one, two);
        assert_eq!(one, file_name_for("https://a.org/v1/paper.pdf")?);
        Ok(())
    }

    #[test]
    fn test_looks_like_pdf() {
        assert!(looks_like_pdf("application/pdf", b""));
        assert!(looks_like_pdf("application/octet-stream", b"%PDF-1.7\n"));
        assert!(!looks_like_pdf("text/html; charset=utf-8", b"<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn test_existing_file_is_not_downloaded_again() -> Result<()> {
        let dir = TempDir::new()?;
        let url = "https://invalid.invalid/cached.pdf";
        let cached = dir.path().join(file_name_for(url)?);
        std::fs::write(&cached, b"%PDF-1.4")?;
        let downloader = PdfDownloader::new(dir.path())?;

        // The host does not resolve, so any request would fail.
        let path = downloader.download(url).await?;
        assert_eq!(path, cached);
        Ok(())
    }

    #[tokio::test]
    async fn test_cached_file_is_not_reused_for_another_query() -> Result<()> {
        let dir = TempDir::new()?;
        let first = "https://invalid.invalid/pdf?id=AAAA";
        std::fs::write(dir.path().join(file_name_for(first)?), b"%PDF-1.4 first paper")?;
        let downloader = PdfDownloader::new(dir.path())?;

        assert_eq!(downloader.download(first).await?, dir.path().join(file_name_for(first)?));
        // A different paper at the same path must trigger a request, which fails here.
        assert!(downloader.download("https://invalid.invalid/pdf?id=BBBB").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_full_text_requires_pdf_link() -> Result<()> {
        let dir = TempDir::new()?;
        let downloader = PdfDownloader::new(dir.path())?;
        let result = SearchResult {
            title: "No link".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            downloader.full_text(&result).await,
            Err(ResearchError::Validation(_))
        ));
        Ok(())
    }
}
