use super::core::PlaygroundClient;
use crate::pipeline::{collect_text, decoder_for, StreamFormat, TextStream};
use crate::protocol::{GenerationRequest, RequestTranslator};
use crate::telemetry::DiagnosticEvent;
use crate::types::message::Message;
use crate::{Error, ErrorContext, Result};
use serde_json::{Map, Value};
use tracing::debug;

impl PlaygroundClient {
    /// Stream a conversational completion from `/api/generate`.
    ///
    /// Waits for the catalog; `params` override the model defaults.
    pub async fn chat(
        &self,
        model_id: &str,
        messages: Vec<Message>,
        params: Map<String, Value>,
    ) -> Result<TextStream> {
        if messages.is_empty() {
            return Err(Error::validation_with_context(
                "at least one message is required",
                ErrorContext::new()
                    .with_field_path("messages")
                    .with_source("client"),
            ));
        }
        debug!(model = %model_id, messages = messages.len(), "chat");
        let catalog = self.await_ready().await?;
        let request = RequestTranslator::new(&catalog).build_chat(model_id, messages, &params)?;
        self.execute(&request).await
    }

    /// Stream a single-prompt completion from `/api/prompt`.
    pub async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        params: Map<String, Value>,
    ) -> Result<TextStream> {
        debug!(model = %model_id, prompt_len = prompt.len(), "generate");
        let catalog = self.await_ready().await?;
        let request = RequestTranslator::new(&catalog).build_prompt(model_id, prompt, &params)?;
        self.execute(&request).await
    }

    /// [`chat`](Self::chat), joined into one string.
    pub async fn chat_text(
        &self,
        model_id: &str,
        messages: Vec<Message>,
        params: Map<String, Value>,
    ) -> Result<String> {
        collect_text(self.chat(model_id, messages, params).await?).await
    }

    /// [`generate`](Self::generate), joined into one string.
    pub async fn generate_text(
        &self,
        model_id: &str,
        prompt: &str,
        params: Map<String, Value>,
    ) -> Result<String> {
        collect_text(self.generate(model_id, prompt, params).await?).await
    }

    /// Send a built request with a freshly minted token.
    pub async fn execute(&self, request: &GenerationRequest) -> Result<TextStream> {
        let token = self.inner.minter.mint().await?;
        let headers = self.inner.transport.generation_headers(token.as_str())?;
        let body = request.to_body()?;

        let endpoint = request.endpoint();
        self.emit(DiagnosticEvent::UpstreamRequest {
            endpoint: endpoint.to_string(),
            model: request.model_id.clone(),
        })
        .await;
        debug!(endpoint, model = %request.model_id, "waiting for response");

        let bytes = self
            .inner
            .transport
            .post_stream(endpoint, &body, headers)
            .await?;
        let format = if request.is_chat() {
            StreamFormat::Text
        } else {
            StreamFormat::JsonStringLines
        };
        decoder_for(format).decode_stream(bytes).await
    }

    /// Fluent per-call parameters for `model_id`.
    pub fn request(&self, model_id: impl Into<String>) -> GenerationBuilder<'_> {
        GenerationBuilder::new(self, model_id.into())
    }
}

/// Builder for one generation call.
pub struct GenerationBuilder<'a> {
    client: &'a PlaygroundClient,
    model_id: String,
    params: Map<String, Value>,
}

impl<'a> GenerationBuilder<'a> {
    pub(crate) fn new(client: &'a PlaygroundClient, model_id: String) -> Self {
        Self {
            client,
            model_id,
            params: Map::new(),
        }
    }

    pub fn temperature(self, temperature: f64) -> Self {
        self.param("temperature", Value::from(temperature))
    }

    pub fn top_p(self, top_p: f64) -> Self {
        self.param("topP", Value::from(top_p))
    }

    pub fn max_tokens(self, max_tokens: u32) -> Self {
        self.param("maxTokens", Value::from(max_tokens))
    }

    pub fn stop_sequences(self, stop: Vec<String>) -> Self {
        self.param("stopSequences", Value::from(stop))
    }

    /// Any other upstream parameter, by its upstream name.
    pub fn param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub async fn chat(self, messages: Vec<Message>) -> Result<TextStream> {
        self.client.chat(&self.model_id, messages, self.params).await
    }

    pub async fn chat_text(self, messages: Vec<Message>) -> Result<String> {
        self.client
            .chat_text(&self.model_id, messages, self.params)
            .await
    }

    pub async fn prompt(self, prompt: &str) -> Result<TextStream> {
        self.client.generate(&self.model_id, prompt, self.params).await
    }

    pub async fn prompt_text(self, prompt: &str) -> Result<String> {
        self.client
            .generate_text(&self.model_id, prompt, self.params)
            .await
    }
}
