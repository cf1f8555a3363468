//! Model-assisted reading for the search-driven flow.
//!
//! A paper is read chunk by chunk with a fixed five-question schema. Reading
//! stops early once the model says a chunk is no longer main text, and never
//! goes past the configured chunk ceiling.

use crate::error::Result;
use crate::llm::{self, ChatBackend, Completion, FieldType, OutputSchema, StructuredOutput, TokenUsage};
use crate::prompts::reading::{
    build_abstract_prompt, build_chunk_prompt, build_keywords_prompt, build_review_prompt,
    SUMMARY_QUESTIONS,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct SearchKeywords {
    keywords: String,
}

impl StructuredOutput for SearchKeywords {
    const SCHEMA: OutputSchema = OutputSchema {
        name: "search_keywords",
        fields: &[("keywords", FieldType::String)],
    };
}

/// Verdict on one abstract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractScreening {
    /// One-sentence statement of the problem solved
    pub summary: String,
    /// Whether the paper is closely related to the search keywords
    pub related: bool,
}

impl StructuredOutput for AbstractScreening {
    const SCHEMA: OutputSchema = OutputSchema {
        name: "abstract_screening",
        fields: &[("summary", FieldType::String), ("related", FieldType::Boolean)],
    };
}

/// Answers for one chunk of a paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChunkDigest {
    pub problem: String,
    pub method: String,
    pub difference: String,
    pub dataset: String,
    /// `None` when the model gave no usable answer
    #[serde(default)]
    pub main_text: Option<bool>,
}

impl StructuredOutput for ChunkDigest {
    const SCHEMA: OutputSchema = OutputSchema {
        name: "chunk_digest",
        fields: &[
            ("problem", FieldType::String),
            ("method", FieldType::String),
            ("difference", FieldType::String),
            ("dataset", FieldType::String),
            ("main_text", FieldType::OptionalBoolean),
        ],
    };
}

impl ChunkDigest {
    /// Answer to question `index` of [`SUMMARY_QUESTIONS`].
    fn answer(&self, index: usize) -> &str {
        match index {
            0 => &self.problem,
            1 => &self.method,
            2 => &self.difference,
            _ => &self.dataset,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RevisedAnswer {
    answer: String,
}

impl StructuredOutput for RevisedAnswer {
    const SCHEMA: OutputSchema = OutputSchema {
        name: "revised_answer",
        fields: &[("answer", FieldType::String)],
    };
}

/// Final per-paper answers after revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperSummary {
    pub problem: String,
    pub method: String,
    pub difference: String,
    pub dataset: String,
}

impl PaperSummary {
    fn set(&mut self, index: usize, answer: String) {
        match index {
            0 => self.problem = answer,
            1 => self.method = answer,
            2 => self.difference = answer,
            _ => self.dataset = answer,
        }
    }
}

/// Turn a research question into a search phrase that differs from `tried`.
pub async fn design_search_keywords<B>(
    backend: &B,
    question: &str,
    tried: &[String],
) -> Result<Completion<String>>
where
    B: ChatBackend + ?Sized,
{
    let completion: Completion<SearchKeywords> =
        llm::request(backend, &build_keywords_prompt(question, tried)).await?;
    Ok(completion.map(|k| {
        k.keywords
            .replace(['"', '\''], "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }))
}

/// Ask whether an abstract is relevant to `keywords`.
pub async fn screen_abstract<B>(
    backend: &B,
    abstract_text: &str,
    keywords: &str,
) -> Result<Completion<AbstractScreening>>
where
    B: ChatBackend + ?Sized,
{
    llm::request(backend, &build_abstract_prompt(abstract_text, keywords)).await
}

/// Read `chunks` in order, at most `max_chunks` of them.
///
/// Stops after the first chunk whose `main_text` answer is `false`. A missing
/// answer keeps reading.
pub async fn read_chunks<B>(
    backend: &B,
    chunks: &[String],
    max_chunks: usize,
) -> Result<Completion<Vec<ChunkDigest>>>
where
    B: ChatBackend + ?Sized,
{
    let mut digests = Vec::new();
    let mut usage = TokenUsage::default();

    for (i, chunk) in chunks.iter().take(max_chunks).enumerate() {
        let completion: Completion<ChunkDigest> =
            llm::request(backend, &build_chunk_prompt(chunk)).await?;
        usage += completion.usage;
        let stop = completion.value.main_text == Some(false);
        digests.push(completion.value);
        if stop {
            debug!(chunk = i + 1, "Main text ended, stop reading");
            break;
        }
    }

    Ok(Completion {
        value: digests,
        usage,
    })
}

/// Read a paper and revise the chunk answers into one [`PaperSummary`].
pub async fn summarize_paper<B>(
    backend: &B,
    chunks: &[String],
    max_chunks: usize,
) -> Result<Completion<PaperSummary>>
where
    B: ChatBackend + ?Sized,
{
    let read = read_chunks(backend, chunks, max_chunks).await?;
    let mut usage = read.usage;
    let mut summary = PaperSummary::default();

    for (index, question) in SUMMARY_QUESTIONS.iter().enumerate() {
        let answers: Vec<&str> = read
            .value
            .iter()
            .map(|d| d.answer(index).trim())
            .filter(|a| !a.is_empty())
            .collect();
        if answers.is_empty() {
            continue;
        }

        let prompt = build_review_prompt(question, &answers.join(" "));
        let revised: Completion<RevisedAnswer> = llm::request(backend, &prompt).await?;
        usage += revised.usage;
        summary.set(index, revised.value.answer.trim().to_string());
    }

    info!(chunks = read.value.len(), tokens = usage.total_tokens, "Summarized paper");
    Ok(Completion {
        value: summary,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedChat;

    fn chunk_json(problem: &str, main_text: &str) -> String {
        format!(
            r#"{{"problem": "{}", "method": "m", "difference": "d", "dataset": "", "main_text": {}}}"#,
            problem, main_text
        )
    }

    fn chunks(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("chunk {}", i)).collect()
    }

    #[tokio::test]
    async fn test_design_search_keywords_strips_quotes() -> Result<()> {
        let chat = ScriptedChat::new();
        chat.reply("search_keywords", r#"{"keywords": "\"landslide detection\"  deep learning"}"#);
        let keywords = design_search_keywords(&chat, "How can deep learning detect landslides?", &[]).await?;
        assert_eq!(keywords.value, "landslide detection deep learning");
        Ok(())
    }

    #[tokio::test]
    async fn test_screen_abstract() -> Result<()> {
        let chat = ScriptedChat::new();
        chat.reply("abstract_screening", r#"{"summary": "Maps landslides.", "related": true}"#);
        let screening = screen_abstract(&chat, "We map landslides.", "landslide").await?;
        assert!(screening.value.related);
        assert_eq!(screening.value.summary, "Maps landslides.");
        Ok(())
    }

    #[tokio::test]
    async fn test_read_chunks_stops_when_main_text_ends() -> Result<()> {
        let chat = ScriptedChat::new();
        chat.reply("chunk_digest", chunk_json("p1", "true"))
            .reply("chunk_digest", chunk_json("p2", "false"))
            .reply("chunk_digest", chunk_json("p3", "true"));

        let read = read_chunks(&chat, &chunks(5), 20).await?;
        assert_eq!(read.value.len(), 2);
        assert_eq!(chat.calls("chunk_digest"), 2);
        assert_eq!(read.usage.total_tokens, 30);
        Ok(())
    }

    #[tokio::test]
    async fn test_read_chunks_missing_answer_continues_up_to_ceiling() -> Result<()> {
        let chat = ScriptedChat::new();
        for _ in 0..5 {
            chat.reply("chunk_digest", chunk_json("p", "null"));
        }
        let read = read_chunks(&chat, &chunks(5), 3).await?;
        assert_eq!(read.value.len(), 3);
        assert!(read.value.iter().all(|d| d.main_text.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn test_summarize_paper_revises_non_empty_answers() -> Result<()> {
        let chat = ScriptedChat::new();
        chat.reply("chunk_digest", chunk_json("first problem", "true"))
            .reply("chunk_digest", chunk_json("second problem", "false"));
        chat.reply("revised_answer", r#"{"answer": "Problem."}"#)
            .reply("revised_answer", r#"{"answer": "Method."}"#)
            .reply("revised_answer", r#"{"answer": "Difference."}"#);

        let summary = summarize_paper(&chat, &chunks(4), 20).await?;
        assert_eq!(summary.value.problem, "Problem.");
        assert_eq!(summary.value.method, "Method.");
        assert_eq!(summary.value.difference, "Difference.");
        // No chunk answered the dataset question.
        assert_eq!(summary.value.dataset, "");
        assert_eq!(chat.calls("revised_answer"), 3);
        assert!(chat.prompts("revised_answer")[0].contains("first problem second problem"));
        assert_eq!(summary.usage.total_tokens, 5 * 15);
        Ok(())
    }
}
