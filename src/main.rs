//! rustresearcher - LLM-assisted literature intake
//!
//! Analyzes a folder of PDFs into a paper store, links each paper to a curated
//! research topic, and discovers new papers through OpenAlex search.
//!
//! ## Usage
//!
//! ### Folder intake
//! ```bash
//! rustresearcher intake --folder pdfs_folder
//! ```
//!
//! ### Search-driven discovery
//! ```bash
//! rustresearcher search "landslide detection" --count 5 --summarize
//! rustresearcher search --question "How can InSAR detect slope failures?" --rounds 3
//! ```
//!
//! ### Reading given papers
//! ```bash
//! rustresearcher summarize papers.csv
//! rustresearcher read paper.pdf --delete
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use rustresearcher::config::Settings;
use rustresearcher::discovery::{self, Discovery, ReadLog};
use rustresearcher::download::PdfDownloader;
use rustresearcher::export::run_stamp;
use rustresearcher::llm::{OpenAiChat, TokenUsage};
use rustresearcher::pipeline::{DocumentOutcome, IntakePipeline};
use rustresearcher::records::TopicRecord;
use rustresearcher::search::OpenAlexSearch;
use rustresearcher::store::{PaperStore, TopicStore};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// LLM-assisted literature intake and discovery
#[derive(Parser)]
#[command(name = "rustresearcher")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Settings file (default: ~/.rustresearcher.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// LLM model name
    #[arg(long, global = true)]
    model: Option<String>,

    /// LLM API base URL (e.g., https://api.openai.com/v1)
    #[arg(long, global = true)]
    llm_base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every new PDF in a folder and link it to its topic
    Intake {
        /// Folder of PDFs (default: paths.pdf_folder)
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// Ask the model for each title before using the line heuristic
        #[arg(long)]
        llm_titles: bool,
    },

    /// Search for papers, screen their abstracts and optionally read them
    Search {
        /// Search keywords
        keywords: Option<String>,

        /// Research question to design keywords from
        #[arg(short, long, conflicts_with = "keywords")]
        question: Option<String>,

        /// Number of papers with a PDF to screen
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Keyword rounds for --question; each round avoids earlier queries
        #[arg(short, long, default_value = "1")]
        rounds: usize,

        /// Read related papers in full and summarize them
        #[arg(long)]
        summarize: bool,
    },

    /// Download and summarize the unread papers of a Title,URL CSV list
    Summarize {
        /// CSV file with Title and URL columns
        list: PathBuf,
    },

    /// Summarize one local PDF
    Read {
        /// PDF file to read
        pdf: PathBuf,

        /// Delete the PDF after a successful summary
        #[arg(long)]
        delete: bool,
    },

    /// Show papers flagged as important
    Review,

    /// Manage the paper store
    Papers {
        #[command(subcommand)]
        action: PaperAction,
    },

    /// Manage the topic store
    Topics {
        #[command(subcommand)]
        action: TopicAction,
    },
}

#[derive(Subcommand)]
enum PaperAction {
    /// List stored paper titles
    List,
    /// Print one paper record
    Show { title: String },
    /// Delete one paper record
    Delete { title: String },
}

#[derive(Subcommand)]
enum TopicAction {
    /// List topic names
    List,
    /// Print one topic record
    Show { name: String },
    /// Add or replace a topic from a JSON file
    Add {
        name: String,
        /// JSON file holding the topic record
        #[arg(long)]
        from: PathBuf,
    },
    /// Delete one topic
    Delete { name: String },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.json_logs {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(model) = cli.model {
        settings.llm.model = model;
    }
    if let Some(url) = cli.llm_base_url {
        settings.llm.base_url = url;
    }
    settings.validate().context("Invalid settings")?;

    match cli.command {
        Commands::Intake { folder, llm_titles } => run_intake(&settings, folder, llm_titles).await,
        Commands::Search {
            keywords,
            question,
            count,
            rounds,
            summarize,
        } => {
            let request = SearchRequest {
                keywords,
                question,
                count,
                rounds,
                summarize,
            };
            run_search(&settings, request).await
        }
        Commands::Summarize { list } => run_summarize_list(&settings, &list).await,
        Commands::Read { pdf, delete } => run_read(&settings, &pdf, delete).await,
        Commands::Review => run_review(&settings),
        Commands::Papers { action } => handle_papers(&settings, action),
        Commands::Topics { action } => handle_topics(&settings, action),
    }
}

// ============================================================================
// Folder Intake
// ============================================================================

async fn run_intake(settings: &Settings, folder: Option<PathBuf>, llm_titles: bool) -> Result<()> {
    let folder = folder.unwrap_or_else(|| settings.paths.pdf_folder.clone());
    let chat = OpenAiChat::new(settings.llm.clone())?;
    let papers = PaperStore::open(&settings.paths.paper_db).context("Failed to open paper store")?;
    let topics = TopicStore::open(&settings.paths.topic_db).context("Failed to open topic store")?;

    info!(folder = ?folder, model = chat.model(), "Starting intake");
    let stamp = run_stamp(&Local::now());

    let report = IntakePipeline::new(&chat, &papers, &topics)
        .with_llm_titles(llm_titles)
        .run_folder(&folder)
        .await
        .context("Intake failed")?;

    let exports = report
        .write_exports(&settings.paths.summary_output, &settings.paths.topic_analysis, &stamp)
        .context("Failed to write exports")?;

    println!("\n--- Intake Summary ---");
    println!(
        "Persisted: {}, skipped: {}, errored: {}, untitled: {}",
        report.analyses.len(),
        report.count(|o| matches!(o, DocumentOutcome::Skipped { .. })),
        report.count(|o| matches!(o, DocumentOutcome::Errored { .. })),
        report.count(|o| matches!(o, DocumentOutcome::Untitled)),
    );
    println!(
        "Important: {}",
        report.count(|o| matches!(o, DocumentOutcome::Persisted { important: true, .. }))
    );
    for path in [exports.analyses, exports.connections].into_iter().flatten() {
        println!("Saved: {}", path.display());
    }
    print_usage(&report.usage);
    Ok(())
}

// ============================================================================
// Search-Driven Discovery
// ============================================================================

struct SearchRequest {
    keywords: Option<String>,
    question: Option<String>,
    count: usize,
    rounds: usize,
    summarize: bool,
}

async fn run_search(settings: &Settings, request: SearchRequest) -> Result<()> {
    if request.rounds == 0 {
        anyhow::bail!("--rounds must be at least 1");
    }
    if request.rounds > 1 && request.question.is_none() {
        anyhow::bail!("--rounds needs --question");
    }

    let chat = OpenAiChat::new(settings.llm.clone())?;
    let search = OpenAlexSearch::new(settings.search.clone())?;
    let downloader = PdfDownloader::new(&settings.paths.download_dir)?;
    let read_log = ReadLog::open(&settings.paths.read_log).context("Failed to open read log")?;
    let discovery = Discovery::new(&chat, &search, &downloader, &read_log, settings.reading.clone());
    let stamp = run_stamp(&Local::now());
    let mut usage = TokenUsage::default();

    println!("\n--- Screening abstracts ---");
    let (label, screened) = match (request.keywords, request.question) {
        (Some(keywords), _) => {
            let screened = discovery.screen(&keywords, request.count).await?;
            (keywords, screened)
        }
        (None, Some(question)) => {
            let screened = discovery.explore(&question, request.rounds, request.count).await?;
            (question, screened)
        }
        (None, None) => anyhow::bail!("Provide search keywords or --question"),
    };
    usage += screened.usage;
    let related = screened.value.iter().filter(|p| p.related).count();
    println!("Screened {} papers, {} related", screened.value.len(), related);

    let summaries = if request.summarize {
        println!("\n--- Reading related papers ---");
        let summaries = discovery.summarize(&screened.value).await?;
        usage += summaries.usage;
        summaries.value
    } else {
        Vec::new()
    };

    let exports = discovery::write_discovery_exports(
        &settings.paths.csv_dir,
        &label,
        &stamp,
        &screened.value,
        &summaries,
    )
    .context("Failed to write exports")?;
    for path in [exports.abstracts, exports.summaries].into_iter().flatten() {
        println!("Saved: {}", path.display());
    }

    print_usage(&usage);
    Ok(())
}

async fn run_summarize_list(settings: &Settings, list: &Path) -> Result<()> {
    let papers = discovery::read_paper_list(list)
        .with_context(|| format!("Failed to read paper list {}", list.display()))?;
    println!("📋 {} papers listed in {}", papers.len(), list.display());

    let chat = OpenAiChat::new(settings.llm.clone())?;
    let search = OpenAlexSearch::new(settings.search.clone())?;
    let downloader = PdfDownloader::new(&settings.paths.download_dir)?;
    let read_log = ReadLog::open(&settings.paths.read_log).context("Failed to open read log")?;
    let discovery = Discovery::new(&chat, &search, &downloader, &read_log, settings.reading.clone());
    let stamp = run_stamp(&Local::now());

    let summaries = discovery.summarize_list(&papers).await?;
    let name = list
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let exports =
        discovery::write_discovery_exports(&settings.paths.csv_dir, &name, &stamp, &[], &summaries.value)
            .context("Failed to write exports")?;
    if let Some(path) = exports.summaries {
        println!("Saved: {}", path.display());
    }

    print_usage(&summaries.usage);
    Ok(())
}

async fn run_read(settings: &Settings, pdf: &Path, delete: bool) -> Result<()> {
    let chat = OpenAiChat::new(settings.llm.clone())?;
    info!(pdf = ?pdf, "Reading local paper");

    let summary = discovery::summarize_local(&chat, pdf, &settings.reading)
        .await
        .with_context(|| format!("Failed to summarize {}", pdf.display()))?;

    println!("\n📄 {}", pdf.display());
    println!("   Problem: {}", summary.value.problem);
    println!("   Method: {}", summary.value.method);
    println!("   Difference: {}", summary.value.difference);
    println!("   Dataset: {}", summary.value.dataset);

    if delete {
        std::fs::remove_file(pdf).with_context(|| format!("Failed to delete {}", pdf.display()))?;
        println!("Deleted: {}", pdf.display());
    }

    print_usage(&summary.usage);
    Ok(())
}

// ============================================================================
// Review & Store Maintenance
// ============================================================================

fn run_review(settings: &Settings) -> Result<()> {
    let papers = PaperStore::open(&settings.paths.paper_db).context("Failed to open paper store")?;
    let important: Vec<_> = papers
        .list()?
        .into_values()
        .filter(|record| record.is_important())
        .collect();

    if important.is_empty() {
        println!("No important papers found.");
        return Ok(());
    }

    println!("=== Important Papers ({}) ===", important.len());
    for record in &important {
        println!("\n📄 {}", record.title());
        println!("   Topic: {}", record.analysis.main_topic);
        if let Some(connection) = &record.connection {
            println!("   Key problem: {}", connection.key_problem);
            if !connection.related_paper.is_empty() {
                println!("   Related paper: {}", connection.related_paper);
                println!("   Comparison: {}", connection.method_comparison);
            }
            println!("   Advancement: {}", connection.topic_advancement);
        }
    }
    Ok(())
}

fn handle_papers(settings: &Settings, action: PaperAction) -> Result<()> {
    let papers = PaperStore::open(&settings.paths.paper_db).context("Failed to open paper store")?;

    match action {
        PaperAction::List => {
            let records = papers.list()?;
            for (title, record) in &records {
                let mark = if record.is_important() { "⭐" } else { " " };
                println!("{} {} ({})", mark, title, record.analysis.year);
            }
            println!("{} papers", records.len());
        }
        PaperAction::Show { title } => match papers.get(&title)? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => anyhow::bail!("No paper titled {:?}", title),
        },
        PaperAction::Delete { title } => {
            if papers.delete(&title)? {
                println!("Deleted paper: {}", title);
            } else {
                println!("No paper titled {:?}", title);
            }
        }
    }
    Ok(())
}

fn handle_topics(settings: &Settings, action: TopicAction) -> Result<()> {
    let topics = TopicStore::open(&settings.paths.topic_db).context("Failed to open topic store")?;

    match action {
        TopicAction::List => {
            for (name, topic) in topics.list()? {
                println!("{} ({} important papers)", name, topic.important_papers.len());
            }
        }
        TopicAction::Show { name } => match topics.get(&name)? {
            Some(topic) => println!("{}", serde_json::to_string_pretty(&topic)?),
            None => anyhow::bail!("No topic named {:?}", name),
        },
        TopicAction::Add { name, from } => {
            let content = std::fs::read_to_string(&from)
                .with_context(|| format!("Failed to read {}", from.display()))?;
            let topic: TopicRecord = serde_json::from_str(&content)
                .with_context(|| format!("Invalid topic record in {}", from.display()))?;
            topics.put(&name, &topic)?;
            println!("Saved topic: {}", name);
        }
        TopicAction::Delete { name } => {
            if topics.delete(&name)? {
                println!("Deleted topic: {}", name);
            } else {
                println!("No topic named {:?}", name);
            }
        }
    }
    Ok(())
}

fn print_usage(usage: &TokenUsage) {
    println!(
        "\nToken usage: prompt {}, completion {}, total {}",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    );
}
