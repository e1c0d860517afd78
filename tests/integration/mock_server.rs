//! Mock HTTP server setup for integration tests

use ai_playground_rust::codec::to_binary;
use ai_playground_rust::telemetry::InMemorySink;
use ai_playground_rust::{ModelCatalog, PlaygroundClient};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const WEBPACK_ASSET: &str = "static/chunks/webpack-1a2b.js";
pub const MODELS_ASSET: &str = "static/chunks/app/page-9f8e.js";

/// Homepage referencing two bundle assets, one of them split across two
/// streaming-render pushes.
pub const HOMEPAGE: &str = concat!(
    r#"<!DOCTYPE html><html><head>"#,
    r#"<script src="/_next/static/chunks/webpack-1a2b.js" async=""></script>"#,
    r#"</head><body><script>self.__next_f.push([1,"2:[\"$\",\"static/chunks/app/page-"])</script><script>self.__next_f.push([1,"9f8e.js\"]"])</script>"#,
    r#"</body></html>"#,
);

/// Minified chunk carrying the model table.
pub const MODELS_SOURCE: &str = concat!(
    r#"(self.webpackChunk_N_E=self.webpackChunk_N_E||[]).push([[931],{1:function(e,t,n){"use strict";"#,
    r#"let r="\n\nHuman:",o={"openai:gpt-3.5-turbo":{id:"openai:gpt-3.5-turbo",provider:"openai","#,
    r#"parameters:{temperature:{value:.7,range:[0,2]},maximumLength:{value:256,range:[50,1024]},"#,
    r#"topP:{value:1,range:[0,1]},presencePenalty:{value:0},frequencyPenalty:{value:0},"#,
    r#"stopSequences:{value:[],range:[]}},enabled:!0},"anthropic:claude-v1":{id:"anthropic:claude-v1","#,
    r#"provider:"anthropic",parameters:{temperature:{value:1},maximumLength:{value:200},"#,
    r#"stopSequences:{value:[r]}},enabled:!1}},i=Object.keys(o);}}]);"#,
);

pub const CHALLENGE_CODE: &str =
    r#"function(a){var s="x".fontcolor();return [a*2,s.length,globalThis.marker]}"#;

/// Token expected for [`challenge_body`] (`a = 21`).
pub fn expected_token(timestamp: &str) -> String {
    to_binary(&json!({ "r": [42, 14, "mark"], "t": timestamp }).to_string())
}

pub fn challenge_body(timestamp: &str) -> String {
    to_binary(&json!({ "c": CHALLENGE_CODE, "a": 21, "t": timestamp }).to_string())
}

pub fn sample_catalog() -> ModelCatalog {
    ModelCatalog::from_json(json!({
        "openai:gpt-3.5-turbo": {
            "id": "openai:gpt-3.5-turbo",
            "provider": "openai",
            "parameters": {
                "temperature": { "value": 0.7 },
                "maximumLength": { "value": 256 }
            }
        }
    }))
    .expect("sample catalog")
}

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
    pub diagnostics: Arc<InMemorySink>,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
            diagnostics: Arc::new(InMemorySink::new(100)),
        }
    }

    /// Client pointed at the mock server; discovery starts immediately.
    pub async fn create_client(&self) -> ai_playground_rust::Result<PlaygroundClient> {
        PlaygroundClient::builder()
            .base_url(&self.base_url)
            .timeout(Duration::from_secs(5))
            .diagnostic_sink(self.diagnostics.clone())
            .build()
            .await
    }

    /// Client with a fixed catalog; no discovery traffic.
    pub async fn create_client_with_catalog(
        &self,
        catalog: ModelCatalog,
    ) -> ai_playground_rust::Result<PlaygroundClient> {
        PlaygroundClient::builder()
            .base_url(&self.base_url)
            .timeout(Duration::from_secs(5))
            .with_catalog(catalog)
            .build()
            .await
    }

    pub async fn mock_get(&self, path: &str, status: usize, body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("GET", path)
            .with_status(status)
            .with_body(body)
            .create_async()
            .await
    }

    /// Homepage plus both bundle assets.
    pub async fn mock_bundle(&self) -> Vec<Mock> {
        vec![
            self.mock_get("/", 200, HOMEPAGE).await,
            self.mock_get(
                &format!("/_next/{}", WEBPACK_ASSET),
                200,
                r#"(()=>{"use strict";var e={};})();"#,
            )
            .await,
            self.mock_get(&format!("/_next/{}", MODELS_ASSET), 200, MODELS_SOURCE)
                .await,
        ]
    }

    pub async fn mock_challenge(&self, timestamp: &str) -> Mock {
        self.mock_get("/openai.jpeg", 200, &challenge_body(timestamp))
            .await
    }

    /// A generation endpoint that only answers requests carrying `token`
    /// and a body containing `body_subset`.
    pub async fn mock_generation(
        &self,
        path: &str,
        token: &str,
        body_subset: Value,
        response: &str,
    ) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", path)
            .match_header("custom-encoding", token)
            .match_header("sec-fetch-mode", "cors")
            .match_body(Matcher::PartialJson(body_subset))
            .with_status(200)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body(response)
            .create_async()
            .await
    }

    pub async fn mock_post_error(&self, path: &str, status: usize, body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", path)
            .with_status(status)
            .with_body(body)
            .create_async()
            .await
    }
}
