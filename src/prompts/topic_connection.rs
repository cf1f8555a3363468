//! Topic connection prompt: how a paper relates to its topic's history.

use super::render;
use crate::records::{PaperAnalysis, TopicRecord};

/// Prompt template for linking a paper to its topic
/// Placeholders: {title}, {summary}, {methodology}, {dataset}, {metrics}, {pros},
/// {cons}, {topic}, {description}, {status}, {papers}, {challenges}, {titles}
pub const CONNECTION_PROMPT_TEMPLATE: &str = r#"Analyze how this paper connects to its research topic.

PAPER ANALYSIS:
Title: {title}
Summary: {summary}
Methodology: {methodology}
Dataset: {dataset}
Metrics: {metrics}
Pros: {pros}
Cons: {cons}

TOPIC INFORMATION:
Topic: {topic}
Description: {description}
Current Status: {status}
Important Papers:
{papers}
Key Challenges to address: {challenges}

Answer these questions:

1. What is the key problem or challenge this paper claims to address?

2. Among the topic's important papers ({titles}), which ONE is most closely related to this paper's method? Copy its title exactly. If none are closely related, leave blank.

3. If a related paper was identified, how does this paper's method relate to or differ from that paper's approach? If no related paper, leave this blank.

4. How does this paper help advance the research topic and address the challenges listed?
Consider the topic's current status: {status} and key challenges: {challenges}

5. Should this paper be read in detail? Consider:
- Does the method show substantial novelty or fundamentally better performance (not just incremental improvement)?
- Does it explore a novel or understudied topic/intersection?
- Is the study extensive and methodologically sound?
Answer true only if the paper meets multiple criteria above and appears particularly significant.

Return a JSON object with these exact fields:
- key_problem: The main problem addressed
- related_paper: The most related important paper (or "" if none)
- method_comparison: Comparison with the related paper (or "" if none)
- topic_advancement: How it advances the topic and addresses challenges
- important: true/false indicating if detailed reading is recommended"#;

/// Build the topic connection prompt
pub fn build_connection_prompt(analysis: &PaperAnalysis, topic: &TopicRecord) -> String {
    let papers = if topic.important_papers.is_empty() {
        "(none)".to_string()
    } else {
        topic
            .important_papers
            .iter()
            .map(|p| p.bullet())
            .collect::<Vec<_>>()
            .join("\n")
    };
    let challenges = topic.key_challenges.join(", ");

    let metrics = analysis.evaluation_metrics.join(", ");
    let pros = analysis.pros.join(", ");
    let cons = analysis.cons.join(", ");
    let titles = topic.important_titles().join(", ");

    render(
        CONNECTION_PROMPT_TEMPLATE,
        &[
            ("title", &analysis.title),
            ("summary", &analysis.summary),
            ("methodology", &analysis.methodology_innovation),
            ("dataset", &analysis.dataset),
            ("metrics", &metrics),
            ("pros", &pros),
            ("cons", &cons),
            ("topic", &analysis.main_topic),
            ("description", &topic.description),
            ("status", &topic.current_status),
            ("papers", &papers),
            ("challenges", &challenges),
            ("titles", &titles),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ImportantPaper;

    #[test]
    fn test_build_connection_prompt_renders_both_paper_shapes() {
        let analysis = PaperAnalysis {
            title: "Sparse Transformers".to_string(),
            main_topic: "NLP".to_string(),
            evaluation_metrics: vec!["BLEU".to_string(), "perplexity".to_string()],
            ..Default::default()
        };
        let topic = TopicRecord {
            description: "Language".to_string(),
            current_status: "Scaling".to_string(),
            key_challenges: vec!["long context".to_string(), "cost".to_string()],
            important_papers: vec![
                ImportantPaper {
                    title: "Attention Is All You Need".to_string(),
                    summary: None,
                },
                ImportantPaper {
                    title: "BERT".to_string(),
                    summary: Some("Bidirectional encoder".to_string()),
                },
            ],
            ..Default::default()
        };

        let prompt = build_connection_prompt(&analysis, &topic);
        assert!(prompt.contains("- Attention Is All You Need\n- BERT: Bidirectional encoder"));
        assert!(prompt.contains("(Attention Is All You Need, BERT)"));
        assert!(prompt.contains("Metrics: BLEU, perplexity"));
        assert!(prompt.contains("key challenges: long context, cost"));
        assert!(!prompt.contains("{papers}"));
        assert!(!prompt.contains("{status}"));
    }

    #[test]
    fn test_braces_in_model_output_survive() {
        let analysis = PaperAnalysis {
            summary: "Optimizes {status} tokens".to_string(),
            ..Default::default()
        };
        let topic = TopicRecord {
            current_status: "Mature".to_string(),
            ..Default::default()
        };
        let prompt = build_connection_prompt(&analysis, &topic);
        assert!(prompt.contains("Summary: Optimizes {status} tokens"));
        assert!(prompt.contains("Current Status: Mature"));
    }
}
