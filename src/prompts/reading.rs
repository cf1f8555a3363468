//! Prompts for the search-driven flow: keyword design, abstract screening,
//! chunk reading and answer revision.

use super::render;

/// Placeholders: {question}, {tried}
pub const KEYWORDS_PROMPT_TEMPLATE: &str = r#"My research question is: {question}
Design the most relevant academic search query for me: a phrase or keywords separated by spaces.{tried}

Return a JSON object with one field:
- keywords: the search query"#;

/// Appended to the keyword prompt after the first round.
/// Placeholders: {tried}
pub const TRIED_KEYWORDS_TEMPLATE: &str = r#"
These queries were already used, so design a different one: {tried}"#;

/// Placeholders: {abstract}, {keywords}
pub const ABSTRACT_PROMPT_TEMPLATE: &str = r#"Read the following text, which includes a research paper abstract:
{abstract}

Answer these questions:
1. What problem does the paper solve?
2. Is it closely related to "{keywords}"?

Return a JSON object with these fields:
- summary: answer to question 1, one sentence
- related: true or false, answer to question 2"#;

/// Placeholders: {chunk}
pub const CHUNK_PROMPT_TEMPLATE: &str = r#"First read a chunk of a research paper:
{chunk}

Now answer the following questions:
1. What is the problem it solves?
2. What is the method it proposes (focus on the model structure and technical improvement)?
3. How is it different from prior methods?
4. What is the dataset tested?
5. Is this chunk part of the main text, rather than references or appendix?

Limit each answer to 1 sentence. If a question cannot be answered from this chunk, answer with an empty string.

Return a JSON object with these fields:
- problem: answer to question 1
- method: answer to question 2
- difference: answer to question 3
- dataset: answer to question 4
- main_text: true or false, answer to question 5"#;

/// Placeholders: {question}, {answers}
pub const REVIEW_PROMPT_TEMPLATE: &str = r#"You read a paper and were given the question: {question}
Your answers while reading it, chunk by chunk, were: {answers}
Rewrite them into at most 2 coherent sentences.

Return a JSON object with one field:
- answer: the rewritten answer"#;

/// Questions revised after reading, in column order
pub const SUMMARY_QUESTIONS: [&str; 4] = [
    "What is the problem the paper addresses",
    "What is the method the paper proposed (include network, necessary math equations)",
    "How is the paper's method different from prior methods",
    "What is the dataset tested in the paper",
];

/// Keyword prompt; `tried` lists queries of earlier rounds that should not be
/// repeated.
pub fn build_keywords_prompt(question: &str, tried: &[String]) -> String {
    let tried = if tried.is_empty() {
        String::new()
    } else {
        render(TRIED_KEYWORDS_TEMPLATE, &[("tried", &tried.join("; "))])
    };
    render(KEYWORDS_PROMPT_TEMPLATE, &[("question", question), ("tried", &tried)])
}

pub fn build_abstract_prompt(abstract_text: &str, keywords: &str) -> String {
    render(
        ABSTRACT_PROMPT_TEMPLATE,
        &[("abstract", abstract_text), ("keywords", keywords)],
    )
}

pub fn build_chunk_prompt(chunk: &str) -> String {
    render(CHUNK_PROMPT_TEMPLATE, &[("chunk", chunk)])
}

pub fn build_review_prompt(question: &str, answers: &str) -> String {
    render(
        REVIEW_PROMPT_TEMPLATE,
        &[("question", question), ("answers", answers)],
    )
}
