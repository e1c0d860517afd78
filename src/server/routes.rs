use super::openai::{
    model_list, sse_frame, ChatCompletionRequest, CompletionRequest, ResponseMeta, SSE_DONE,
};
use super::AppState;
use crate::pipeline::TextStream;
use crate::{Error, ErrorContext};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use futures::{stream, Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::fmt;
use tracing::{debug, error};

/// Registers every route; shared by [`serve`](super::serve) and tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(1 << 20)
            .error_handler(|err, _req| {
                ApiError(Error::validation_with_context(
                    err.to_string(),
                    ErrorContext::new().with_source("request_body"),
                ))
                .into()
            }),
    )
    .route("/health", web::get().to(health_check))
    .route("/v1/models", web::get().to(list_models))
    .route("/v1/chat/completions", web::post().to(chat_completions))
    .route("/v1/completions", web::post().to(completions));
}

/// [`Error`] rendered as an OpenAI error body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match &self.0 {
            Error::UnknownModel { .. } => "not_found_error",
            Error::NotReady | Error::Discovery(_) => "service_unavailable",
            Error::Token(_) | Error::Upstream { .. } | Error::Transport(_) => "upstream_error",
            Error::Validation { .. } => "invalid_request_error",
            Error::Configuration { .. } | Error::Serialization(_) => "internal_error",
        }
    }

    fn body(&self) -> serde_json::Value {
        json!({ "error": { "message": self.0.to_string(), "type": self.kind() } })
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            Error::UnknownModel { .. } => StatusCode::NOT_FOUND,
            Error::NotReady | Error::Discovery(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Token(_) | Error::Upstream { .. } | Error::Transport(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Configuration { .. } | Error::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self.0, %status, "request failed");
        } else {
            debug!(error = %self.0, %status, "request rejected");
        }
        HttpResponse::build(status).json(self.body())
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn list_models(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let catalog = state.client.try_catalog()?;
    Ok(HttpResponse::Ok().json(model_list(&catalog)))
}

async fn chat_completions(
    state: web::Data<AppState>,
    body: web::Json<ChatCompletionRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();
    let messages = req.to_messages()?;
    let params = req.params.to_upstream();
    let meta = ResponseMeta::new("chatcmpl", &req.model);

    if req.stream {
        let text = state.client.chat(&req.model, messages, params).await?;
        return Ok(event_stream(chat_frames(meta, text)));
    }

    let content = state.client.chat_text(&req.model, messages, params).await?;
    Ok(HttpResponse::Ok().json(meta.chat_completion(&content)))
}

async fn completions(
    state: web::Data<AppState>,
    body: web::Json<CompletionRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();
    let prompt = req.prompt_text()?;
    let params = req.params.to_upstream();
    let meta = ResponseMeta::new("cmpl", &req.model);

    if req.stream {
        let text = state.client.generate(&req.model, &prompt, params).await?;
        return Ok(event_stream(completion_frames(meta, text)));
    }

    let text = state
        .client
        .generate_text(&req.model, &prompt, params)
        .await?;
    Ok(HttpResponse::Ok().json(meta.text_completion(&text)))
}

fn event_stream<S>(frames: S) -> HttpResponse
where
    S: Stream<Item = String> + 'static,
{
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("cache-control", "no-cache"))
        .streaming(frames.map(|frame| Ok::<_, Infallible>(web::Bytes::from(frame))))
}

/// A mid-stream failure becomes an error frame; the stream still ends with `[DONE]`.
fn error_frame(e: &Error) -> String {
    error!(error = %e, "upstream stream failed");
    sse_frame(&json!({ "error": { "message": e.to_string(), "type": "upstream_error" } }))
}

pub(crate) fn chat_frames(meta: ResponseMeta, text: TextStream) -> impl Stream<Item = String> {
    let head = sse_frame(&meta.chat_chunk(json!({ "role": "assistant" }), None));
    let tail = vec![
        sse_frame(&meta.chat_chunk(json!({}), Some("stop"))),
        SSE_DONE.to_string(),
    ];
    let body = text.map(move |item| match item {
        Ok(fragment) => sse_frame(&meta.chat_chunk(json!({ "content": fragment }), None)),
        Err(e) => error_frame(&e),
    });
    stream::once(async move { head })
        .chain(body)
        .chain(stream::iter(tail))
}

pub(crate) fn completion_frames(
    meta: ResponseMeta,
    text: TextStream,
) -> impl Stream<Item = String> {
    let tail = vec![sse_frame(&meta.text_chunk("", Some("stop"))), SSE_DONE.to_string()];
    text.map(move |item| match item {
        Ok(fragment) => sse_frame(&meta.text_chunk(&fragment, None)),
        Err(e) => error_frame(&e),
    })
    .chain(stream::iter(tail))
}
