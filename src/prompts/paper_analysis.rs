//! Paper analysis and title inference prompts.

use super::render;

/// Prompt template for structured paper analysis
/// Placeholders: {abstract}, {introduction}, {topics}
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyze the following paper abstract and introduction to extract key information.
Provide a structured analysis including publication details, methodology, and critical evaluation.

ABSTRACT:
{abstract}

INTRODUCTION:
{introduction}

Available research topics (choose ONE that best matches, or leave blank if none match):
{topics}

Return a JSON object with these fields:
- journal_conference: Journal or conference where it was published
- year: Year of publication (integer)
- title: Paper title
- url_or_doi: URL or DOI if present in the text, otherwise null
- main_topic: Main research topic; must be exactly one of the topics above, or "" if none match
- keywords: 3-5 key technical keywords
- methodology_innovation: Main methodological innovation
- dataset: Datasets used in the paper
- evaluation_metrics: Evaluation metrics
- summary: Core message of the paper in 2-3 sentences
- pros: 2-3 key strengths of the method
- cons: 2-3 limitations of the method

For main_topic, copy one topic name exactly as listed, or leave it blank if none are suitable."#;

/// Prompt template for title inference
/// Placeholders: {text}
pub const TITLE_PROMPT_TEMPLATE: &str = r#"Given the beginning of an academic paper, identify its title.
Return only the main title (no subtitle).
If multiple possible titles are found, return the most likely one.

Paper beginning:
{text}

Return a JSON object with one field:
- title: The inferred paper title"#;

/// Build the analysis prompt
pub fn build_analysis_prompt(abstract_text: &str, introduction: &str, topics: &[String]) -> String {
    let topics = if topics.is_empty() {
        "(no topics defined)".to_string()
    } else {
        topics
            .iter()
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n")
    };
    render(
        ANALYSIS_PROMPT_TEMPLATE,
        &[
            ("abstract", abstract_text),
            ("introduction", introduction),
            ("topics", &topics),
        ],
    )
}

/// Build the title inference prompt
pub fn build_title_prompt(text_sample: &str) -> String {
    render(TITLE_PROMPT_TEMPLATE, &[("text", text_sample)])
}
