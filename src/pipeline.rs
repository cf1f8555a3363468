//! Folder-driven paper intake.
//!
//! Each document goes through title inference, deduplication against the
//! paper store, analysis and (when its topic resolves) topic linking, and is
//! then persisted. Documents are processed one at a time. A model failure only
//! ends the current document; a store failure ends the run.

use crate::analyzer;
use crate::error::{ResearchError, Result};
use crate::export::{self, AnalysisRow, ConnectionRow, ExportPaths};
use crate::linker;
use crate::llm::{ChatBackend, TokenUsage};
use crate::pdf::{self, Document};
use crate::records::PaperRecord;
use crate::store::{PaperStore, TopicStore};
use std::path::Path;
use tracing::{error, info, warn};

/// Where one document ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// No title could be inferred
    Untitled,
    /// A paper with this title is already stored
    Skipped { title: String },
    /// Analyzed and stored
    Persisted {
        title: String,
        linked: bool,
        important: bool,
    },
    /// Analysis or linking failed
    Errored { title: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReport {
    pub filename: String,
    pub outcome: DocumentOutcome,
}

/// Everything accumulated over one intake run.
#[derive(Debug, Default)]
pub struct IntakeReport {
    pub documents: Vec<DocumentReport>,
    /// One row per persisted document
    pub analyses: Vec<AnalysisRow>,
    /// One row per persisted document that was linked to its topic
    pub connections: Vec<ConnectionRow>,
    pub usage: TokenUsage,
}

impl IntakeReport {
    pub fn count(&self, matches: impl Fn(&DocumentOutcome) -> bool) -> usize {
        self.documents.iter().filter(|d| matches(&d.outcome)).count()
    }

    /// Write the run's CSV exports, stamped with `stamp`.
    pub fn write_exports(&self, summary_dir: &Path, topic_dir: &Path, stamp: &str) -> Result<ExportPaths> {
        export::write_intake_exports(&self.analyses, &self.connections, summary_dir, topic_dir, stamp)
    }
}

/// Orchestrates analysis and linking over a batch of documents.
pub struct IntakePipeline<'a> {
    backend: &'a dyn ChatBackend,
    papers: &'a PaperStore,
    topics: &'a TopicStore,
    llm_titles: bool,
}

impl<'a> IntakePipeline<'a> {
    pub fn new(backend: &'a dyn ChatBackend, papers: &'a PaperStore, topics: &'a TopicStore) -> Self {
        Self {
            backend,
            papers,
            topics,
            llm_titles: false,
        }
    }

    /// Ask the model for titles before falling back to the line heuristic.
    pub fn with_llm_titles(mut self, enabled: bool) -> Self {
        self.llm_titles = enabled;
        self
    }

    /// Process every PDF in `folder`.
    pub async fn run_folder(&self, folder: &Path) -> Result<IntakeReport> {
        let documents = pdf::load_folder(folder);
        println!("📂 Found {} readable PDFs in {:?}", documents.len(), folder);
        self.run_documents(documents).await
    }

    /// Process `documents` in order, then re-save both stores.
    pub async fn run_documents(&self, documents: Vec<Document>) -> Result<IntakeReport> {
        let mut report = IntakeReport::default();

        for document in documents {
            let outcome = self.process(&document, &mut report).await?;
            report.documents.push(DocumentReport {
                filename: document.filename,
                outcome,
            });
        }

        self.papers.save()?;
        self.topics.save()?;

        info!(
            documents = report.documents.len(),
            persisted = report.analyses.len(),
            linked = report.connections.len(),
            "Intake finished"
        );
        Ok(report)
    }

    async fn process(&self, document: &Document, report: &mut IntakeReport) -> Result<DocumentOutcome> {
        let Some(title) = self.title_of(document, &mut report.usage).await else {
            warn!(filename = %document.filename, "Could not infer title");
            println!("⚠️  {}: could not infer title", document.filename);
            return Ok(DocumentOutcome::Untitled);
        };

        if self.papers.contains(&title)? {
            println!("⏭️  Skipping already analyzed paper: {}", title);
            return Ok(DocumentOutcome::Skipped { title });
        }

        println!("📄 Analyzing: {}", title);
        let known_topics = self.topics.keys()?;

        let analysis = match analyzer::analyze(self.backend, &document.text, &known_topics).await {
            Ok(completion) => {
                report.usage += completion.usage;
                completion.value
            }
            Err(e) => return self.errored(title, e),
        };

        let connection = match linker::connect(self.backend, &analysis, self.topics).await {
            Ok(completion) => completion.map(|c| {
                report.usage += c.usage;
                c.value
            }),
            Err(e) => return self.errored(title, e),
        };

        let record = PaperRecord::new(&title, analysis, connection);
        self.papers.put(&title, &record)?;

        report.analyses.push(AnalysisRow::new(&record.analysis, &document.filename));
        if let Some(connection) = &record.connection {
            report
                .connections
                .push(ConnectionRow::new(connection, &document.filename, &title));
        }

        let important = record.is_important();
        if important {
            println!("⭐ Important paper: {}", title);
        }
        Ok(DocumentOutcome::Persisted {
            linked: record.connection.is_some(),
            important,
            title,
        })
    }

    async fn title_of(&self, document: &Document, usage: &mut TokenUsage) -> Option<String> {
        if self.llm_titles {
            if let Some(completion) = analyzer::infer_title_llm(self.backend, &document.text).await {
                *usage += completion.usage;
                return Some(completion.value);
            }
        }
        pdf::infer_title(&document.text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    fn errored(&self, title: String, e: ResearchError) -> Result<DocumentOutcome> {
        if e.is_storage_failure() {
            return Err(e);
        }
        error!(title = %title, error = %e, "Error processing paper");
        println!("❌ Error processing {}: {}", title, e);
        Ok(DocumentOutcome::Errored {
            title,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedChat;
    use crate::llm::{ChatReply, OutputSchema};
    use crate::records::{ImportantPaper, PaperAnalysis, TopicRecord};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Overwrites the topic store with garbage once a paper has been analyzed.
    struct CorruptsTopics {
        inner: ScriptedChat,
        topic_db: PathBuf,
    }

    #[async_trait]
    impl ChatBackend for CorruptsTopics {
        async fn complete(&self, prompt: &str, schema: &OutputSchema) -> Result<ChatReply> {
            let reply = self.inner.complete(prompt, schema).await;
            if schema.name == "paper_analysis" {
                std::fs::write(&self.topic_db, "{ not json")?;
            }
            reply
        }
    }

    struct Fixture {
        dir: TempDir,
        papers: PaperStore,
        topics: TopicStore,
    }

    fn fixture() -> Result<Fixture> {
        let dir = TempDir::new()?;
        let papers = PaperStore::open(dir.path().join("papers.json"))?;
        let topics = TopicStore::open(dir.path().join("topics.json"))?;
        topics.put(
            "NLP",
            &TopicRecord {
                description: "Natural language processing".to_string(),
                important_papers: vec![ImportantPaper {
                    title: "BERT".to_string(),
                    summary: None,
                }],
                ..Default::default()
            },
        )?;
        Ok(Fixture {
            dir,
            papers,
            topics,
        })
    }

    fn document(filename: &str, title: &str) -> Document {
        Document {
            filename: filename.to_string(),
            text: format!("{}\nJ. Smith, A. Lee, B. Chen, C. Wu\nAbstract\nWe propose things.\n1. Introduction\nBody.", title),
        }
    }

    fn analysis_json(topic: &str) -> String {
        format!(
            r#"{{"journal_conference": "ACL", "year": 2020, "title": "model reading of the title",
                "url_or_doi": null, "main_topic": "{}", "keywords": ["a", "b", "c"],
                "methodology_innovation": "m", "dataset": "d", "evaluation_metrics": ["F1"],
                "summary": "s", "pros": ["p"], "cons": ["c"]}}"#,
            topic
        )
    }

    fn connection_json(related: &str, comparison: &str, important: bool) -> String {
        format!(
            r#"{{"key_problem": "k", "related_paper": "{}", "method_comparison": "{}",
                "topic_advancement": "adv", "important": {}}}"#,
            related, comparison, important
        )
    }

    #[tokio::test]
    async fn test_duplicate_title_makes_no_model_calls() -> Result<()> {
        let f = fixture()?;
        let existing = PaperRecord::new("Existing Paper Title", PaperAnalysis::default(), None);
        f.papers.put("Existing Paper Title", &existing)?;
        let before = f.papers.list()?;

        let chat = ScriptedChat::new();
        let pipeline = IntakePipeline::new(&chat, &f.papers, &f.topics);
        let report = pipeline
            .run_documents(vec![document("dup", "Existing Paper Title")])
            .await?;

        assert_eq!(chat.calls("paper_analysis"), 0);
        assert_eq!(f.papers.list()?, before);
        assert_eq!(
            report.documents[0].outcome,
            DocumentOutcome::Skipped {
                title: "Existing Paper Title".to_string()
            }
        );
        assert!(report.analyses.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_topic_is_persisted_blank_and_unlinked() -> Result<()> {
        let f = fixture()?;
        let chat = ScriptedChat::new();
        chat.reply("paper_analysis", analysis_json("Robotics"));

        let pipeline = IntakePipeline::new(&chat, &f.papers, &f.topics);
        let report = pipeline
            .run_documents(vec![document("p1", "Learning To Walk Quickly")])
            .await?;

        let stored = f.papers.get("Learning To Walk Quickly")?;
        let stored = stored.ok_or_else(|| ResearchError::Validation("not stored".to_string()))?;
        assert_eq!(stored.analysis.main_topic, "");
        assert_eq!(stored.connection, None);
        assert_eq!(chat.calls("topic_connection"), 0);
        assert_eq!(report.analyses.len(), 1);
        assert!(report.connections.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_persisted_connections_pair_related_and_comparison() -> Result<()> {
        let f = fixture()?;
        let chat = ScriptedChat::new();
        chat.reply("paper_analysis", analysis_json("NLP"))
            .reply("paper_analysis", analysis_json("NLP"))
            .reply("paper_analysis", analysis_json("NLP"));
        chat.reply("topic_connection", connection_json("BERT", "", false))
            .reply("topic_connection", connection_json("", "Compared with something", false))
            .reply("topic_connection", connection_json("BERT", "Adds a decoder", true));

        let pipeline = IntakePipeline::new(&chat, &f.papers, &f.topics);
        let report = pipeline
            .run_documents(vec![
                document("a", "First Paper About Language"),
                document("b", "Second Paper About Language"),
                document("c", "Third Paper About Language"),
            ])
            .await?;

        for record in f.papers.list()?.values() {
            let connection = record
                .connection
                .as_ref()
                .ok_or_else(|| ResearchError::Validation("not linked".to_string()))?;
            assert_eq!(
                connection.related_paper.is_empty(),
                connection.method_comparison.is_empty()
            );
        }
        assert_eq!(report.connections.len(), 3);
        assert_eq!(report.count(|o| matches!(o, DocumentOutcome::Persisted { important: true, .. })), 1);
        assert_eq!(report.usage.total_tokens, 6 * 15);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_document_does_not_stop_the_batch() -> Result<()> {
        let f = fixture()?;
        let chat = ScriptedChat::new();
        chat.reply("paper_analysis", analysis_json(""))
            .fail("paper_analysis", "model unavailable")
            .reply("paper_analysis", analysis_json(""));

        let pipeline = IntakePipeline::new(&chat, &f.papers, &f.topics);
        let report = pipeline
            .run_documents(vec![
                document("one", "Paper Number One Title"),
                document("two", "Paper Number Two Title"),
                document("three", "Paper Number Three Title"),
            ])
            .await?;

        assert!(f.papers.contains("Paper Number One Title")?);
        assert!(!f.papers.contains("Paper Number Two Title")?);
        assert!(f.papers.contains("Paper Number Three Title")?);
        assert!(matches!(report.documents[1].outcome, DocumentOutcome::Errored { .. }));
        assert_eq!(report.analyses.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_link_is_not_persisted_and_batch_continues() -> Result<()> {
        let f = fixture()?;
        let chat = ScriptedChat::new();
        chat.reply("paper_analysis", analysis_json("NLP"))
            .reply("paper_analysis", analysis_json("NLP"))
            .reply("paper_analysis", analysis_json("NLP"));
        chat.reply("topic_connection", connection_json("BERT", "Adds pretraining", false))
            .fail("topic_connection", "rate limit exhausted")
            .reply("topic_connection", connection_json("", "", false));

        let pipeline = IntakePipeline::new(&chat, &f.papers, &f.topics);
        let report = pipeline
            .run_documents(vec![
                document("one", "Language Paper Number One"),
                document("two", "Language Paper Number Two"),
                document("three", "Language Paper Number Three"),
            ])
            .await?;

        assert!(f.papers.contains("Language Paper Number One")?);
        assert!(!f.papers.contains("Language Paper Number Two")?);
        assert!(f.papers.contains("Language Paper Number Three")?);
        assert!(matches!(
            &report.documents[1].outcome,
            DocumentOutcome::Errored { title, message }
                if title == "Language Paper Number Two" && message.contains("rate limit exhausted")
        ));
        assert_eq!(report.analyses.len(), 2);
        assert_eq!(report.connections.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_topic_store_ends_the_run() -> Result<()> {
        let f = fixture()?;
        let chat = CorruptsTopics {
            inner: ScriptedChat::new(),
            topic_db: f.dir.path().join("topics.json"),
        };
        chat.inner
            .reply("paper_analysis", analysis_json("NLP"))
            .reply("paper_analysis", analysis_json("NLP"));

        let pipeline = IntakePipeline::new(&chat, &f.papers, &f.topics);
        let result = pipeline
            .run_documents(vec![
                document("one", "Language Paper Number One"),
                document("two", "Language Paper Number Two"),
            ])
            .await;

        assert!(matches!(result, Err(ResearchError::Store { .. })));
        assert_eq!(chat.inner.calls("paper_analysis"), 1);
        assert_eq!(chat.inner.calls("topic_connection"), 0);
        assert!(!f.papers.contains("Language Paper Number One")?);
        Ok(())
    }

    #[tokio::test]
    async fn test_exports_match_persisted_and_linked_counts() -> Result<()> {
        let f = fixture()?;
        let chat = ScriptedChat::new();
        chat.reply("paper_analysis", analysis_json("NLP"))
            .reply("paper_analysis", analysis_json(""));
        chat.reply("topic_connection", connection_json("BERT", "Longer training", false));

        let pipeline = IntakePipeline::new(&chat, &f.papers, &f.topics);
        let report = pipeline
            .run_documents(vec![
                document("linked", "A Linked Language Paper"),
                document("plain", "An Unlinked Paper Title"),
                Document {
                    filename: "blank".to_string(),
                    text: "short\nAbstract".to_string(),
                },
            ])
            .await?;

        let out = TempDir::new()?;
        let paths = report.write_exports(&out.path().join("summary"), &out.path().join("topics"), "20240101_120000")?;

        let analyses = paths
            .analyses
            .ok_or_else(|| ResearchError::Validation("no analysis export".to_string()))?;
        let connections = paths
            .connections
            .ok_or_else(|| ResearchError::Validation("no connection export".to_string()))?;
        assert_eq!(csv::Reader::from_path(analyses)?.records().count(), 2);
        assert_eq!(csv::Reader::from_path(connections)?.records().count(), 1);
        assert_eq!(report.documents[2].outcome, DocumentOutcome::Untitled);
        Ok(())
    }

    #[tokio::test]
    async fn test_llm_titles_fall_back_to_heuristic() -> Result<()> {
        let f = fixture()?;
        let chat = ScriptedChat::new();
        chat.reply("inferred_title", r#"{"title": "Model Chosen Title"}"#)
            .fail("inferred_title", "timeout");
        chat.reply("paper_analysis", analysis_json(""))
            .reply("paper_analysis", analysis_json(""));

        let pipeline = IntakePipeline::new(&chat, &f.papers, &f.topics).with_llm_titles(true);
        pipeline
            .run_documents(vec![
                document("x", "Heuristic Title Number One"),
                document("y", "Heuristic Title Number Two"),
            ])
            .await?;

        assert_eq!(
            f.papers.keys()?,
            vec!["Heuristic Title Number Two".to_string(), "Model Chosen Title".to_string()]
        );
        Ok(())
    }
}
