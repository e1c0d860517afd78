//! OpenAI-compatible routes over a mocked upstream

use crate::integration::mock_server::{expected_token, sample_catalog, MockServerFixture};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use ai_playground_rust::server::{configure, AppState};
use ai_playground_rust::PlaygroundClient;
use serde_json::{json, Value};

const TIMESTAMP: &str = "1681000000";

macro_rules! app {
    ($client:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState { client: $client }))
                .configure(configure),
        )
        .await
    };
}

async fn catalog_client(fixture: &MockServerFixture) -> PlaygroundClient {
    fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap()
}

#[actix_web::test]
async fn health_check_answers() {
    let fixture = MockServerFixture::new().await;
    let app = app!(catalog_client(&fixture).await);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(test::read_body(resp).await, "OK");
}

#[actix_web::test]
async fn lists_discovered_models() {
    let fixture = MockServerFixture::new().await;
    let app = app!(catalog_client(&fixture).await);

    let body: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/v1/models").to_request())
            .await;
    assert_eq!(body["object"], "list");
    assert_eq!(body["data"][0]["id"], "openai:gpt-3.5-turbo");
    assert_eq!(body["data"][0]["owned_by"], "openai");
}

#[actix_web::test]
async fn models_unavailable_when_discovery_failed() {
    let fixture = MockServerFixture::new().await;
    let _home = fixture.mock_get("/", 200, "<html></html>").await;
    let client = fixture.create_client().await.unwrap();
    assert!(client.await_ready().await.is_err());
    let app = app!(client);

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/v1/models").to_request()).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "service_unavailable");
}

#[actix_web::test]
async fn chat_completion_without_streaming() {
    let fixture = MockServerFixture::new().await;
    let _challenge = fixture.mock_challenge(TIMESTAMP).await;
    let _generate = fixture
        .mock_generation(
            "/api/generate",
            &expected_token(TIMESTAMP),
            json!({ "model": "openai:gpt-3.5-turbo", "temperature": 0.3, "maxTokens": 256 }),
            "Hi!",
        )
        .await;
    let app = app!(catalog_client(&fixture).await);

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .set_json(json!({
            "model": "openai:gpt-3.5-turbo",
            "messages": [{ "role": "user", "content": "hello" }],
            "temperature": 0.3
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "openai:gpt-3.5-turbo");
    assert_eq!(body["choices"][0]["message"]["content"], "Hi!");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

#[actix_web::test]
async fn chat_completion_streams_sse_frames() {
    let fixture = MockServerFixture::new().await;
    let _challenge = fixture.mock_challenge(TIMESTAMP).await;
    let _generate = fixture
        .mock_generation(
            "/api/generate",
            &expected_token(TIMESTAMP),
            json!({ "model": "openai:gpt-3.5-turbo" }),
            "streamed reply",
        )
        .await;
    let app = app!(catalog_client(&fixture).await);

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .set_json(json!({
            "model": "openai:gpt-3.5-turbo",
            "messages": [{ "role": "user", "content": "hello" }],
            "stream": true
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let body = test::read_body(resp).await;
    let text = std::str::from_utf8(&body).unwrap();
    let frames: Vec<&str> = text.split("\n\n").filter(|f| !f.is_empty()).collect();
    assert!(frames[0].contains(r#""role":"assistant""#));
    assert!(text.contains(r#""content":"streamed reply""#));
    assert_eq!(frames.last().copied(), Some("data: [DONE]"));
}

#[actix_web::test]
async fn text_completion_unwraps_json_lines() {
    let fixture = MockServerFixture::new().await;
    let _challenge = fixture.mock_challenge(TIMESTAMP).await;
    let _prompt = fixture
        .mock_generation(
            "/api/prompt",
            &expected_token(TIMESTAMP),
            json!({ "prompt": "Once", "stopSequences": ["\n"] }),
            "\" upon\"\n\" a time\"\n",
        )
        .await;
    let app = app!(catalog_client(&fixture).await);

    let req = test::TestRequest::post()
        .uri("/v1/completions")
        .set_json(json!({ "model": "openai:gpt-3.5-turbo", "prompt": "Once", "stop": "\n" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["object"], "text_completion");
    assert_eq!(body["choices"][0]["text"], " upon a time");
}

#[actix_web::test]
async fn unknown_model_is_not_found() {
    let fixture = MockServerFixture::new().await;
    let app = app!(catalog_client(&fixture).await);

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .set_json(json!({
            "model": "nobody:none",
            "messages": [{ "role": "user", "content": "hello" }]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "not_found_error");
}

#[actix_web::test]
async fn malformed_body_is_a_bad_request() {
    let fixture = MockServerFixture::new().await;
    let app = app!(catalog_client(&fixture).await);

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .set_json(json!({ "model": "openai:gpt-3.5-turbo" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[actix_web::test]
async fn upstream_failure_is_a_bad_gateway() {
    let fixture = MockServerFixture::new().await;
    let _challenge = fixture.mock_get("/openai.jpeg", 500, "down").await;
    let app = app!(catalog_client(&fixture).await);

    let req = test::TestRequest::post()
        .uri("/v1/completions")
        .set_json(json!({ "model": "openai:gpt-3.5-turbo", "prompt": "x" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}
