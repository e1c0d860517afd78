//! OpenAI wire types and their mapping onto playground calls.

use crate::catalog::ModelCatalog;
use crate::types::message::{Message, MessageRole};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Sampling parameters shared by both request kinds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SamplingParams {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop: Option<StopSpec>,
    pub max_tokens: Option<u64>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StopSpec {
    One(String),
    Many(Vec<String>),
}

impl SamplingParams {
    /// Upstream parameter names. Unset fields are left to the model defaults.
    pub fn to_upstream(&self) -> Map<String, Value> {
        let mut params = Map::new();
        if let Some(t) = self.temperature {
            params.insert("temperature".into(), json!(t));
        }
        if let Some(p) = self.top_p {
            params.insert("topP".into(), json!(p));
        }
        if let Some(stop) = &self.stop {
            let list = match stop {
                StopSpec::One(s) => vec![s.clone()],
                StopSpec::Many(v) => v.clone(),
            };
            params.insert("stopSequences".into(), json!(list));
        }
        if let Some(n) = self.max_tokens {
            params.insert("maxTokens".into(), json!(n));
        }
        if let Some(p) = self.presence_penalty {
            params.insert("presencePenalty".into(), json!(p));
        }
        if let Some(p) = self.frequency_penalty {
            params.insert("frequencyPenalty".into(), json!(p));
        }
        params
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessageIn {
    pub role: String,
    /// A string or a list of content parts; only text parts are kept.
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessageIn>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub params: SamplingParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PromptSpec {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: PromptSpec,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub params: SamplingParams,
}

fn invalid(message: impl Into<String>, field: &str) -> Error {
    Error::validation_with_context(
        message,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("openai_compat"),
    )
}

impl ChatCompletionRequest {
    pub fn to_messages(&self) -> Result<Vec<Message>> {
        self.messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let role = match m.role.as_str() {
                    "system" => MessageRole::System,
                    "user" => MessageRole::User,
                    "assistant" => MessageRole::Assistant,
                    other => {
                        return Err(invalid(
                            format!("unsupported role '{}'", other),
                            &format!("messages[{}].role", i),
                        ))
                    }
                };
                Ok(Message::new(role, content_text(&m.content)))
            })
            .collect()
    }
}

impl CompletionRequest {
    pub fn prompt_text(&self) -> Result<String> {
        match &self.prompt {
            PromptSpec::One(p) => Ok(p.clone()),
            PromptSpec::Many(list) if list.len() == 1 => Ok(list[0].clone()),
            PromptSpec::Many(_) => Err(invalid("exactly one prompt is supported", "prompt")),
        }
    }
}

fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

/// Token counts are not reported upstream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Usage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Identity of one response across its envelope and stream frames.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub id: String,
    pub created: i64,
    pub model: String,
}

impl ResponseMeta {
    pub fn new(prefix: &str, model: &str) -> Self {
        Self {
            id: format!("{}-{}", prefix, uuid::Uuid::new_v4().simple()),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
        }
    }

    pub fn chat_completion(&self, content: &str) -> Value {
        json!({
            "id": self.id,
            "object": "chat.completion",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }],
            "usage": Usage::default()
        })
    }

    pub fn text_completion(&self, text: &str) -> Value {
        json!({
            "id": self.id,
            "object": "text_completion",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "text": text,
                "logprobs": null,
                "finish_reason": "stop"
            }],
            "usage": Usage::default()
        })
    }

    /// One `chat.completion.chunk`.
    pub fn chat_chunk(&self, delta: Value, finish_reason: Option<&str>) -> Value {
        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [{ "index": 0, "delta": delta, "finish_reason": finish_reason }]
        })
    }

    /// One streamed `text_completion` frame.
    pub fn text_chunk(&self, text: &str, finish_reason: Option<&str>) -> Value {
        json!({
            "id": self.id,
            "object": "text_completion",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "text": text,
                "logprobs": null,
                "finish_reason": finish_reason
            }]
        })
    }
}

/// `GET /v1/models` body.
pub fn model_list(catalog: &ModelCatalog) -> Value {
    let data: Vec<Value> = catalog
        .iter()
        .map(|(id, spec)| {
            json!({
                "id": id,
                "object": "model",
                "created": 0,
                "owned_by": spec.provider.as_deref().unwrap_or("playground"),
            })
        })
        .collect();
    json!({ "object": "list", "data": data })
}

/// `data: <json>\n\n`
pub fn sse_frame(payload: &Value) -> String {
    format!("data: {}\n\n", payload)
}

pub const SSE_DONE: &str = "data: [DONE]\n\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_openai_parameters() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "openai:gpt-4",
            "messages": [{ "role": "user", "content": "hi" }],
            "temperature": 0.2,
            "top_p": 0.9,
            "stop": "END",
            "max_tokens": 64,
            "presence_penalty": 0.5,
            "frequency_penalty": 0.1
        }))
        .unwrap();
        assert_eq!(
            Value::Object(req.params.to_upstream()),
            json!({
                "temperature": 0.2,
                "topP": 0.9,
                "stopSequences": ["END"],
                "maxTokens": 64,
                "presencePenalty": 0.5,
                "frequencyPenalty": 0.1
            })
        );
        assert!(!req.stream);
    }

    #[test]
    fn flattens_text_content_parts() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": [
                    { "type": "text", "text": "a" },
                    { "type": "image_url", "image_url": { "url": "x" } },
                    { "type": "text", "text": "b" }
                ]}
            ]
        }))
        .unwrap();
        let messages = req.to_messages().unwrap();
        assert_eq!(messages[0], Message::system("be brief"));
        assert_eq!(messages[1], Message::user("ab"));
    }

    #[test]
    fn rejects_unsupported_roles_and_prompt_batches() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [{ "role": "tool", "content": "x" }]
        }))
        .unwrap();
        assert!(matches!(req.to_messages(), Err(Error::Validation { .. })));

        let req: CompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "prompt": ["a", "b"]
        }))
        .unwrap();
        assert!(matches!(req.prompt_text(), Err(Error::Validation { .. })));
    }

    #[test]
    fn envelopes_carry_null_usage() {
        let meta = ResponseMeta::new("chatcmpl", "m");
        let body = meta.chat_completion("hello");
        assert_eq!(body["object"], "chat.completion");
        assert_eq!(body["choices"][0]["message"]["content"], "hello");
        assert_eq!(
            body["usage"],
            json!({ "prompt_tokens": null, "completion_tokens": null, "total_tokens": null })
        );
        assert!(meta.id.starts_with("chatcmpl-"));
    }
}
