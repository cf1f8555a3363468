//! # rustresearcher
//!
//! LLM-assisted literature intake: analyze PDFs into structured records, link
//! them to curated research topics, and discover new papers through search.
//!
//! ## Modules
//!
//! - [`pipeline`] - Folder-driven intake (title, dedup, analysis, linking)
//! - [`analyzer`] - Paper analysis and LLM title inference
//! - [`linker`] - Topic linking against a topic's important papers
//! - [`store`] - Flat JSON record stores
//! - [`llm`] - Structured-output gateway to an OpenAI-compatible model
//! - [`discovery`] - Search, abstract screening and full-text summaries
//! - [`search`] - OpenAlex search backend
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustresearcher::config::Settings;
//! use rustresearcher::llm::OpenAiChat;
//! use rustresearcher::pipeline::IntakePipeline;
//! use rustresearcher::store::{PaperStore, TopicStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let chat = OpenAiChat::new(settings.llm.clone())?;
//!     let papers = PaperStore::open(&settings.paths.paper_db)?;
//!     let topics = TopicStore::open(&settings.paths.topic_db)?;
//!
//!     let report = IntakePipeline::new(&chat, &papers, &topics)
//!         .run_folder(&settings.paths.pdf_folder)
//!         .await?;
//!     println!("Analyzed {} papers", report.analyses.len());
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod config;
pub mod discovery;
pub mod download;
pub mod error;
pub mod export;
pub mod linker;
pub mod llm;
pub mod pdf;
pub mod pipeline;
pub mod prompts;
pub mod reader;
pub mod records;
pub mod search;
pub mod store;

pub use error::{ResearchError, Result};
