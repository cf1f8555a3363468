//! Prompt module for LLM-based operations.
//!
//! This module provides the prompt templates for every model call.

pub mod paper_analysis;
pub mod reading;
pub mod topic_connection;

/// Fill `{name}` placeholders of `template` in one pass.
///
/// Only placeholders in the template itself are replaced, so inserted paper
/// text or model output that contains braces is copied verbatim. Unknown
/// placeholders are left as they are.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
