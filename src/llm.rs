//! Structured-output gateway to an OpenAI-compatible chat model.
//!
//! Every model call in the crate is one request/response pair: a prompt plus
//! an [`OutputSchema`] goes in, a value of the matching Rust type comes out,
//! or the call fails. Token usage travels back with each value as a
//! [`Completion`] so callers can sum it without shared counters.

use crate::config::LlmSettings;
use crate::error::{OptionExt, ResearchError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::ops::AddAssign;
use std::time::Duration;
use tracing::debug;

/// Expected JSON type of one output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    StringList,
    /// String that may be missing or `null`
    OptionalString,
    /// Boolean that may be missing or `null`
    OptionalBoolean,
}

impl FieldType {
    fn json_schema(self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Integer => json!({"type": "integer"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::StringList => json!({"type": "array", "items": {"type": "string"}}),
            Self::OptionalString => json!({"type": ["string", "null"]}),
            Self::OptionalBoolean => json!({"type": ["boolean", "null"]}),
        }
    }

    fn is_required(self) -> bool {
        !matches!(self, Self::OptionalString | Self::OptionalBoolean)
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::OptionalString => value.is_null() || value.is_string(),
            Self::OptionalBoolean => value.is_null() || value.is_boolean(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::StringList => "list of strings",
            Self::OptionalString => "string or null",
            Self::OptionalBoolean => "boolean or null",
        }
    }
}

/// Named set of fields the model must return as one JSON object.
#[derive(Debug, Clone, Copy)]
pub struct OutputSchema {
    pub name: &'static str,
    pub fields: &'static [(&'static str, FieldType)],
}

impl OutputSchema {
    /// JSON Schema sent as the `response_format`.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, ty)| (name.to_string(), ty.json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|(_, ty)| ty.is_required())
            .map(|(name, _)| *name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check every declared field against the model output.
    pub fn validate(&self, value: &Value) -> Result<()> {
        let object = value.as_object().ok_or_else(|| ResearchError::Schema {
            schema: self.name,
            message: "output is not a JSON object".to_string(),
        })?;

        for (name, ty) in self.fields {
            match object.get(*name) {
                None if ty.is_required() => {
                    return Err(ResearchError::Schema {
                        schema: self.name,
                        message: format!("missing field `{}`", name),
                    })
                }
                Some(v) if !ty.accepts(v) => {
                    return Err(ResearchError::Schema {
                        schema: self.name,
                        message: format!("field `{}` is not a {}", name, ty.describe()),
                    })
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// A type the model can be asked to produce.
pub trait StructuredOutput: DeserializeOwned {
    const SCHEMA: OutputSchema;
}

/// Token usage tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A model answer together with what it cost.
#[derive(Debug, Clone)]
pub struct Completion<T> {
    pub value: T,
    pub usage: TokenUsage,
}

impl<T> Completion<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Completion<U> {
        Completion {
            value: f(self.value),
            usage: self.usage,
        }
    }
}

/// Raw reply from a chat backend, before schema validation.
#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    pub content: String,
    pub usage: TokenUsage,
}

/// Transport to a chat model.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, prompt: &str, schema: &OutputSchema) -> Result<ChatReply>;
}

/// Ask `backend` for a value of type `T`.
///
/// Fails if the transport fails, if the reply has no JSON object, or if the
/// object does not satisfy `T::SCHEMA`.
pub async fn request<T, B>(backend: &B, prompt: &str) -> Result<Completion<T>>
where
    T: StructuredOutput,
    B: ChatBackend + ?Sized,
{
    let reply = backend.complete(prompt, &T::SCHEMA).await?;
    let value = parse_structured::<T>(&reply.content)?;
    Ok(Completion {
        value,
        usage: reply.usage,
    })
}

/// Parse and validate model output against `T::SCHEMA`.
pub fn parse_structured<T: StructuredOutput>(content: &str) -> Result<T> {
    let json_str = extract_json(content);
    let value: Value = serde_json::from_str(&json_str).map_err(|e| {
        let preview: String = content.chars().take(200).collect();
        debug!(error = %e, content_preview = %preview, "Model output is not JSON");
        ResearchError::Schema {
            schema: T::SCHEMA.name,
            message: format!("output is not valid JSON: {}", e),
        }
    })?;
    T::SCHEMA.validate(&value)?;
    serde_json::from_value(value).map_err(|e| ResearchError::Schema {
        schema: T::SCHEMA.name,
        message: e.to_string(),
    })
}

/// Extract JSON from LLM response (handles markdown code blocks)
///
/// Candidates are tried in order: the body of a leading code fence, the
/// outermost braces, then the whole text. The first that parses as JSON wins;
/// when none does, the first candidate is returned for error reporting.
fn extract_json(content: &str) -> String {
    let trimmed = content.trim();
    let mut candidates: Vec<&str> = Vec::new();

    if let Some(fenced) = trimmed.strip_prefix("```") {
        let body = fenced.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
        let body = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
        candidates.push(body.trim());
        candidates.extend(outer_braces(body));
    }
    candidates.extend(outer_braces(trimmed));
    candidates.push(trimmed);

    candidates
        .iter()
        .find(|c| serde_json::from_str::<Value>(c).is_ok())
        .or_else(|| candidates.first())
        .map(|c| c.to_string())
        .unwrap_or_default()
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// OpenAI-compatible API response structures
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

/// Chat backend speaking the `/chat/completions` protocol (OpenAI, Ollama's
/// `/v1` endpoint, and compatible servers).
pub struct OpenAiChat {
    client: reqwest::Client,
    settings: LlmSettings,
}

impl OpenAiChat {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ResearchError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn request_body(&self, prompt: &str, schema: &OutputSchema) -> Value {
        json!({
            "model": self.settings.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": self.settings.temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.to_json_schema(),
                }
            }
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    async fn complete(&self, prompt: &str, schema: &OutputSchema) -> Result<ChatReply> {
        let api_url = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );

        debug!(schema = schema.name, model = %self.settings.model, "Sending LLM request");

        let mut request = self
            .client
            .post(&api_url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, schema));
        if let Some(key) = &self.settings.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ResearchError::Api {
                code: status.as_u16() as i32,
                message: format!("LLM API error: {} - {}", status, error_text),
            });
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ResearchError::Parse(format!("Failed to parse LLM response: {}", e)))?;

        let usage = api_response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_parse("LLM response has no message content")?;

        Ok(ChatReply { content, usage })
    }
}
