//! Generation calls end to end: token, request body, decoded stream

use crate::integration::mock_server::{expected_token, sample_catalog, MockServerFixture};
use ai_playground_rust::{collect_text, Error, Message};
use futures::StreamExt;
use serde_json::{json, Map};

const TIMESTAMP: &str = "1681000000";

#[tokio::test]
async fn chat_posts_to_generate_with_defaults() {
    let fixture = MockServerFixture::new().await;
    let _challenge = fixture.mock_challenge(TIMESTAMP).await;
    let generate = fixture
        .mock_generation(
            "/api/generate",
            &expected_token(TIMESTAMP),
            json!({
                "model": "openai:gpt-3.5-turbo",
                "chatIndex": 0,
                "temperature": 0.7,
                "maxTokens": 256,
                "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "hi" }
                ]
            }),
            "Hello there!",
        )
        .await;

    let client = fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap();
    let text = client
        .chat_text(
            "openai:gpt-3.5-turbo",
            vec![Message::system("be brief"), Message::user("hi")],
            Map::new(),
        )
        .await
        .unwrap();

    assert_eq!(text, "Hello there!");
    generate.assert_async().await;
}

#[tokio::test]
async fn prompt_stream_is_unwrapped_from_json_lines() {
    let fixture = MockServerFixture::new().await;
    let _challenge = fixture.mock_challenge(TIMESTAMP).await;
    let _prompt = fixture
        .mock_generation(
            "/api/prompt",
            &expected_token(TIMESTAMP),
            json!({ "model": "openai:gpt-3.5-turbo", "prompt": "Say hi" }),
            "\"Hello\"\n\"World\"\n",
        )
        .await;

    let client = fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap();
    let stream = client
        .generate("openai:gpt-3.5-turbo", "Say hi", Map::new())
        .await
        .unwrap();
    let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;

    assert_eq!(fragments, vec!["Hello", "World"]);
}

#[tokio::test]
async fn builder_overrides_reach_the_request_body() {
    let fixture = MockServerFixture::new().await;
    let _challenge = fixture.mock_challenge(TIMESTAMP).await;
    let generate = fixture
        .mock_generation(
            "/api/generate",
            &expected_token(TIMESTAMP),
            json!({
                "temperature": 0.1,
                "maxTokens": 32,
                "stopSequences": ["END"]
            }),
            "ok",
        )
        .await;

    let client = fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap();
    let stream = client
        .request("openai:gpt-3.5-turbo")
        .temperature(0.1)
        .max_tokens(32)
        .stop_sequences(vec!["END".to_string()])
        .chat(vec![Message::user("hi")])
        .await
        .unwrap();

    assert_eq!(collect_text(stream).await.unwrap(), "ok");
    generate.assert_async().await;
}

#[tokio::test]
async fn unknown_model_fails_before_any_upstream_call() {
    let fixture = MockServerFixture::new().await;
    let challenge = fixture.mock_challenge(TIMESTAMP).await;

    let client = fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap();
    let err = client
        .generate_text("nobody:none", "hi", Map::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownModel { model } if model == "nobody:none"));
    assert!(!challenge.matched_async().await);
}

#[tokio::test]
async fn empty_conversation_is_rejected() {
    let fixture = MockServerFixture::new().await;
    let client = fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap();
    let err = client
        .chat("openai:gpt-3.5-turbo", Vec::new(), Map::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn upstream_failure_carries_status_and_body() {
    let fixture = MockServerFixture::new().await;
    let _challenge = fixture.mock_challenge(TIMESTAMP).await;
    let _generate = fixture
        .mock_post_error("/api/generate", 429, "rate limited")
        .await;

    let client = fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap();
    let err = client
        .chat_text("openai:gpt-3.5-turbo", vec![Message::user("hi")], Map::new())
        .await
        .unwrap_err();

    match err {
        Error::Upstream {
            status,
            endpoint,
            body,
        } => {
            assert_eq!(status, 429);
            assert_eq!(endpoint, "/api/generate");
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn generation_waits_for_discovery() {
    let fixture = MockServerFixture::new().await;
    let _bundle = fixture.mock_bundle().await;
    let _challenge = fixture.mock_challenge(TIMESTAMP).await;
    let _prompt = fixture
        .mock_generation(
            "/api/prompt",
            &expected_token(TIMESTAMP),
            json!({ "model": "anthropic:claude-v1", "maxTokens": 200, "stopSequences": ["\n\nHuman:"] }),
            "\"fine\"\n",
        )
        .await;

    let client = fixture.create_client().await.unwrap();
    let text = client
        .generate_text("anthropic:claude-v1", "how are you", Map::new())
        .await
        .unwrap();
    assert_eq!(text, "fine");
}
