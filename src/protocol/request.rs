//! Upstream request construction.

use super::{CHAT_ENDPOINT, PROMPT_ENDPOINT};
use crate::catalog::{DefaultParams, ModelCatalog};
use crate::types::message::Message;
use crate::{Error, Result};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Canonical spelling of the output-length limit.
pub const MAX_TOKENS: &str = "maxTokens";
/// Legacy spelling, folded into [`MAX_TOKENS`].
pub const MAXIMUM_LENGTH: &str = "maximumLength";

/// Which endpoint a request targets, with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationKind {
    Chat { messages: Vec<Message> },
    Prompt { prompt: String },
}

/// A fully resolved upstream call. Built fresh per call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model_id: String,
    pub kind: GenerationKind,
    /// Defaults merged with overrides.
    pub params: Map<String, Value>,
    /// `playgroundId`; chat only.
    pub session_id: Option<Uuid>,
    /// `chatIndex`; chat only.
    pub message_index: u32,
}

impl GenerationRequest {
    pub fn endpoint(&self) -> &'static str {
        match self.kind {
            GenerationKind::Chat { .. } => CHAT_ENDPOINT,
            GenerationKind::Prompt { .. } => PROMPT_ENDPOINT,
        }
    }

    pub fn is_chat(&self) -> bool {
        matches!(self.kind, GenerationKind::Chat { .. })
    }

    /// Request body: the parameters flattened at top level, then the
    /// endpoint-specific fields.
    pub fn to_body(&self) -> Result<Value> {
        let mut body = self.params.clone();
        match &self.kind {
            GenerationKind::Chat { messages } => {
                body.insert("messages".into(), serde_json::to_value(messages)?);
                body.insert("chatIndex".into(), Value::from(self.message_index));
                body.insert("model".into(), Value::String(self.model_id.clone()));
                if let Some(session_id) = self.session_id {
                    body.insert(
                        "playgroundId".into(),
                        Value::String(session_id.to_string()),
                    );
                }
            }
            GenerationKind::Prompt { prompt } => {
                body.insert("prompt".into(), Value::String(prompt.clone()));
                body.insert("model".into(), Value::String(self.model_id.clone()));
            }
        }
        Ok(Value::Object(body))
    }
}

/// Overlay `overrides` on `defaults` key by key, then fold the two spellings
/// of the length limit into `maxTokens`.
///
/// `maxTokens` wins when it is set (not null, not zero); otherwise
/// `maximumLength` is used. `maximumLength` never survives the merge.
pub fn merge_params(defaults: DefaultParams, overrides: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults;
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }

    let legacy = merged.remove(MAXIMUM_LENGTH);
    let resolved = merged
        .get(MAX_TOKENS)
        .filter(|v| is_set(v))
        .cloned()
        .or_else(|| legacy.filter(is_set));
    if let Some(value) = resolved {
        merged.insert(MAX_TOKENS.to_string(), value);
    }
    merged
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        _ => true,
    }
}

/// Builds [`GenerationRequest`]s against a discovered catalog.
pub struct RequestTranslator<'a> {
    catalog: &'a ModelCatalog,
}

impl<'a> RequestTranslator<'a> {
    pub fn new(catalog: &'a ModelCatalog) -> Self {
        Self { catalog }
    }

    pub fn build_chat(
        &self,
        model_id: &str,
        messages: Vec<Message>,
        overrides: &Map<String, Value>,
    ) -> Result<GenerationRequest> {
        Ok(GenerationRequest {
            model_id: model_id.to_string(),
            params: self.params_for(model_id, overrides)?,
            kind: GenerationKind::Chat { messages },
            session_id: Some(Uuid::new_v4()),
            message_index: 0,
        })
    }

    pub fn build_prompt(
        &self,
        model_id: &str,
        prompt: impl Into<String>,
        overrides: &Map<String, Value>,
    ) -> Result<GenerationRequest> {
        Ok(GenerationRequest {
            model_id: model_id.to_string(),
            params: self.params_for(model_id, overrides)?,
            kind: GenerationKind::Prompt {
                prompt: prompt.into(),
            },
            session_id: None,
            message_index: 0,
        })
    }

    fn params_for(&self, model_id: &str, overrides: &Map<String, Value>) -> Result<Map<String, Value>> {
        let defaults = self
            .catalog
            .default_params(model_id)
            .ok_or_else(|| Error::unknown_model(model_id))?;
        Ok(merge_params(defaults, overrides))
    }
}
