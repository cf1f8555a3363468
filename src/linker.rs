//! Topic linking: compare an analyzed paper against its topic's record.

use crate::error::Result;
use crate::llm::{self, ChatBackend, Completion, FieldType, OutputSchema, StructuredOutput};
use crate::prompts::topic_connection::build_connection_prompt;
use crate::records::{PaperAnalysis, TopicConnection};
use crate::store::TopicStore;
use tracing::debug;

impl StructuredOutput for TopicConnection {
    const SCHEMA: OutputSchema = OutputSchema {
        name: "topic_connection",
        fields: &[
            ("key_problem", FieldType::String),
            ("related_paper", FieldType::String),
            ("method_comparison", FieldType::String),
            ("topic_advancement", FieldType::String),
            ("important", FieldType::Boolean),
        ],
    };
}

/// Link `analysis` to the record of its `main_topic`.
///
/// Returns `Ok(None)` without calling the model when the topic is blank or not
/// in `topics`. The returned `related_paper` is always one of the topic's
/// important-paper titles or empty, and is empty iff `method_comparison` is.
pub async fn connect<B>(
    backend: &B,
    analysis: &PaperAnalysis,
    topics: &TopicStore,
) -> Result<Option<Completion<TopicConnection>>>
where
    B: ChatBackend + ?Sized,
{
    if analysis.main_topic.is_empty() {
        return Ok(None);
    }
    let Some(topic) = topics.get(&analysis.main_topic)? else {
        debug!(topic = %analysis.main_topic, "Topic not found, skipping connection");
        return Ok(None);
    };

    let prompt = build_connection_prompt(analysis, &topic);
    let mut completion: Completion<TopicConnection> = llm::request(backend, &prompt).await?;
    completion.value.normalize_related(&topic.important_titles());
    Ok(Some(completion))
}
