//! Paper analysis: one model call turns raw paper text into a
//! [`PaperAnalysis`].
//!
//! Only the abstract and introduction are sent. Both are located by their
//! section headers; when a header is missing, fixed character windows of the
//! text stand in for it.

use crate::error::Result;
use crate::llm::{self, ChatBackend, Completion, FieldType, OutputSchema, StructuredOutput};
use crate::prompts::paper_analysis::{build_analysis_prompt, build_title_prompt};
use crate::records::PaperAnalysis;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Characters used as the abstract when no abstract header is found
const ABSTRACT_FALLBACK_CHARS: usize = 2000;

/// Characters (after the abstract window) used as the introduction fallback
const INTRODUCTION_FALLBACK_CHARS: usize = 5000;

/// Leading characters sent for title inference
const TITLE_SAMPLE_CHARS: usize = 500;

impl StructuredOutput for PaperAnalysis {
    const SCHEMA: OutputSchema = OutputSchema {
        name: "paper_analysis",
        fields: &[
            ("journal_conference", FieldType::String),
            ("year", FieldType::Integer),
            ("title", FieldType::String),
            ("url_or_doi", FieldType::OptionalString),
            ("main_topic", FieldType::String),
            ("keywords", FieldType::StringList),
            ("methodology_innovation", FieldType::String),
            ("dataset", FieldType::String),
            ("evaluation_metrics", FieldType::StringList),
            ("summary", FieldType::String),
            ("pros", FieldType::StringList),
            ("cons", FieldType::StringList),
        ],
    };
}

#[derive(Debug, Deserialize)]
struct InferredTitle {
    title: String,
}

impl StructuredOutput for InferredTitle {
    const SCHEMA: OutputSchema = OutputSchema {
        name: "inferred_title",
        fields: &[("title", FieldType::String)],
    };
}

struct SectionPatterns {
    abstract_start: Regex,
    abstract_end: Regex,
    intro_start: Regex,
    intro_end: Regex,
}

fn patterns() -> Option<&'static SectionPatterns> {
    static PATTERNS: OnceLock<Option<SectionPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(SectionPatterns {
                abstract_start: Regex::new(r"(?i)abstract\s*\n").ok()?,
                abstract_end: Regex::new(r"(?i)\n\s*(?:introduction|\d\.|keywords)").ok()?,
                intro_start: Regex::new(r"(?i)introduction\s*\n").ok()?,
                intro_end: Regex::new(r"(?i)\n\s*(?:2\.|background|related work)").ok()?,
            })
        })
        .as_ref()
}

/// Text after the first `start` header up to the next `end` marker.
fn section<'a>(text: &'a str, start: &Regex, end: &Regex) -> Option<&'a str> {
    let header = start.find(text)?;
    let body = &text[header.end()..];
    let stop = end.find(body)?;
    Some(&body[..stop.start()])
}

/// Split paper text into `(abstract, introduction)`.
pub fn extract_sections(text: &str) -> (String, String) {
    let found = patterns().map(|p| {
        (
            section(text, &p.abstract_start, &p.abstract_end),
            section(text, &p.intro_start, &p.intro_end),
        )
    });
    let (abstract_text, introduction) = found.unwrap_or((None, None));

    let abstract_text = match abstract_text {
        Some(s) => s.trim().to_string(),
        None => text
            .chars()
            .take(ABSTRACT_FALLBACK_CHARS)
            .collect::<String>()
            .trim()
            .to_string(),
    };
    let introduction = match introduction {
        Some(s) => s.trim().to_string(),
        None => text
            .chars()
            .skip(ABSTRACT_FALLBACK_CHARS)
            .take(INTRODUCTION_FALLBACK_CHARS)
            .collect::<String>()
            .trim()
            .to_string(),
    };
    (abstract_text, introduction)
}

/// Analyze a paper with one model call.
///
/// A `main_topic` outside `known_topics` is cleared before returning. Model
/// and transport errors are returned as-is.
pub async fn analyze<B>(
    backend: &B,
    text: &str,
    known_topics: &[String],
) -> Result<Completion<PaperAnalysis>>
where
    B: ChatBackend + ?Sized,
{
    let (abstract_text, introduction) = extract_sections(text);
    let prompt = build_analysis_prompt(&abstract_text, &introduction, known_topics);

    let mut completion: Completion<PaperAnalysis> = llm::request(backend, &prompt).await?;

    let analysis = &mut completion.value;
    analysis.main_topic = analysis.main_topic.trim().to_string();
    if !analysis.main_topic.is_empty() && !known_topics.contains(&analysis.main_topic) {
        debug!(topic = %analysis.main_topic, "Model chose an unknown topic, clearing it");
        analysis.main_topic.clear();
    }
    Ok(completion)
}

/// Ask the model for the title of a paper from its first 500 characters.
///
/// Returns `None` (with a warning) on any failure or a blank answer.
pub async fn infer_title_llm<B>(backend: &B, text: &str) -> Option<Completion<String>>
where
    B: ChatBackend + ?Sized,
{
    let sample: String = text.chars().take(TITLE_SAMPLE_CHARS).collect();
    let sample = sample.trim();
    if sample.is_empty() {
        return None;
    }

    match llm::request::<InferredTitle, _>(backend, &build_title_prompt(sample)).await {
        Ok(completion) => {
            let completion = completion.map(|t| t.title.trim().to_string());
            if completion.value.is_empty() {
                None
            } else {
                Some(completion)
            }
        }
        Err(e) => {
            warn!(error = %e, "Error inferring title");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResearchError;
    use crate::llm::testing::ScriptedChat;

    fn analysis_json(topic: &str) -> String {
        format!(
            r#"{{"journal_conference": "NeurIPS", "year": 2017, "title": "Attention Is All You Need",
                "url_or_doi": null, "main_topic": "{}", "keywords": ["attention", "transformer", "translation"],
                "methodology_innovation": "Self-attention", "dataset": "WMT14",
                "evaluation_metrics": ["BLEU"], "summary": "Attention suffices.",
                "pros": ["parallel"], "cons": ["quadratic cost"]}}"#,
            topic
        )
    }

    #[test]
    fn test_extract_sections_with_headers() {
        let text = "Title\nAbstract\nWe propose a model.\n1. Introduction\nRecurrent models are slow.\n2. Background\nMore.";
        let (abstract_text, intro) = extract_sections(text);
        assert_eq!(abstract_text, "We propose a model.");
        assert_eq!(intro, "Recurrent models are slow.");
    }

    #[test]
    fn test_extract_sections_is_case_insensitive() {
        let text = "ABSTRACT\nShort abstract.\nKEYWORDS: a, b\nINTRODUCTION\nIntro text.\nRELATED WORK\n...";
        let (abstract_text, intro) = extract_sections(text);
        assert_eq!(abstract_text, "Short abstract.");
        assert_eq!(intro, "Intro text.");
    }

    #[test]
    fn test_extract_sections_falls_back_to_windows() {
        let text: String = "x".repeat(2500) + &"y".repeat(6000);
        let (abstract_text, intro) = extract_sections(&text);
        assert_eq!(abstract_text.chars().count(), 2000);
        assert!(abstract_text.chars().all(|c| c == 'x'));
        assert_eq!(intro.chars().count(), 5000);
        assert!(intro.starts_with(&"x".repeat(500)));

        let (abstract_text, intro) = extract_sections("tiny");
        assert_eq!(abstract_text, "tiny");
        assert_eq!(intro, "");
    }

    #[tokio::test]
    async fn test_analyze_keeps_known_topic() -> Result<()> {
        let chat = ScriptedChat::new();
        chat.reply("paper_analysis", analysis_json("NLP"));
        let topics = vec!["NLP".to_string()];

        let completion = analyze(&chat, "Abstract\nWe propose.\n1. Intro", &topics).await?;
        assert_eq!(completion.value.main_topic, "NLP");
        assert_eq!(completion.value.year, 2017);
        assert_eq!(completion.usage.total_tokens, 15);

        let prompt = &chat.prompts("paper_analysis")[0];
        assert!(prompt.contains("We propose."));
        assert!(prompt.contains("- NLP"));
        Ok(())
    }

    #[tokio::test]
    async fn test_analyze_clears_unknown_topic() -> Result<()> {
        let chat = ScriptedChat::new();
        chat.reply("paper_analysis", analysis_json("Computer Vision"));
        let completion = analyze(&chat, "text", &["NLP".to_string()]).await?;
        assert_eq!(completion.value.main_topic, "");
        Ok(())
    }

    #[tokio::test]
    async fn test_analyze_propagates_schema_errors() {
        let chat = ScriptedChat::new();
        chat.reply("paper_analysis", r#"{"title": "only a title"}"#);
        let result = analyze(&chat, "text", &[]).await;
        assert!(matches!(result, Err(ResearchError::Schema { schema: "paper_analysis", .. })));
    }

    #[tokio::test]
    async fn test_infer_title_llm() {
        let chat = ScriptedChat::new();
        chat.reply("inferred_title", r#"{"title": "  Watch Every Step!  "}"#);
        let title = infer_title_llm(&chat, "Proceedings of EMNLP 2024\nWatch Every Step! LLM Agent Learning").await;
        assert_eq!(title.map(|c| c.value).as_deref(), Some("Watch Every Step!"));

        chat.fail("inferred_title", "down");
        assert!(infer_title_llm(&chat, "some text").await.is_none());
        assert!(infer_title_llm(&chat, "   ").await.is_none());
    }
}
