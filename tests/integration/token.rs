//! Token minting against a mocked challenge endpoint

use crate::integration::mock_server::{expected_token, sample_catalog, MockServerFixture};
use ai_playground_rust::codec::to_binary;
use ai_playground_rust::telemetry::DiagnosticEvent;
use ai_playground_rust::{Error, TokenError};
use serde_json::json;

#[tokio::test]
async fn mints_token_from_challenge() {
    let fixture = MockServerFixture::new().await;
    let challenge = fixture.mock_challenge("1681000000").await;

    let client = fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap();
    let token = client.mint_token().await.unwrap();

    assert_eq!(token.as_str(), expected_token("1681000000"));
    challenge.assert_async().await;
}

#[tokio::test]
async fn each_challenge_yields_a_fresh_token() {
    let fixture = MockServerFixture::new().await;
    let client = fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap();

    let first_mock = fixture.mock_challenge("1681000000").await;
    let first = client.mint_token().await.unwrap();
    first_mock.remove_async().await;

    let _second_mock = fixture.mock_challenge("1681000042").await;
    let second = client.mint_token().await.unwrap();

    assert_ne!(first.as_str(), second.as_str());
    assert_eq!(second.as_str(), expected_token("1681000042"));
}

#[tokio::test]
async fn minting_reports_diagnostics() {
    let fixture = MockServerFixture::new().await;
    let _challenge = fixture.mock_challenge("1").await;
    let _home = fixture.mock_get("/", 200, "<html></html>").await;

    let client = fixture.create_client().await.unwrap();
    client.mint_token().await.unwrap();

    assert!(fixture
        .diagnostics
        .events()
        .iter()
        .any(|e| matches!(e, DiagnosticEvent::TokenMinted { .. })));
}

#[tokio::test]
async fn challenge_fetch_failure_is_a_token_error() {
    let fixture = MockServerFixture::new().await;
    let _challenge = fixture.mock_get("/openai.jpeg", 500, "boom").await;

    let client = fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap();
    let err = client.mint_token().await.unwrap_err();
    assert!(matches!(err, Error::Token(TokenError::Fetch(_))));
}

#[tokio::test]
async fn undecodable_challenge_is_rejected() {
    let fixture = MockServerFixture::new().await;
    let _challenge = fixture.mock_get("/openai.jpeg", 200, "%%%not base64%%%").await;

    let client = fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap();
    let err = client.mint_token().await.unwrap_err();
    assert!(matches!(err, Error::Token(TokenError::Decode(_))));
}

#[tokio::test]
async fn challenge_with_wrong_arity_is_rejected() {
    let fixture = MockServerFixture::new().await;
    let body = to_binary(
        &json!({ "c": "function(a){return [a, a]}", "a": 1, "t": "7" }).to_string(),
    );
    let _challenge = fixture.mock_get("/openai.jpeg", 200, &body).await;

    let client = fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap();
    let err = client.mint_token().await.unwrap_err();
    assert!(matches!(err, Error::Token(TokenError::UnexpectedShape(_))));
}

#[tokio::test]
async fn challenge_that_throws_is_an_evaluation_error() {
    let fixture = MockServerFixture::new().await;
    let body = to_binary(
        &json!({ "c": "function(a){return a.missing.field}", "a": 1, "t": "7" }).to_string(),
    );
    let _challenge = fixture.mock_get("/openai.jpeg", 200, &body).await;

    let client = fixture
        .create_client_with_catalog(sample_catalog())
        .await
        .unwrap();
    let err = client.mint_token().await.unwrap_err();
    assert!(matches!(err, Error::Token(TokenError::Evaluation(_))));
}
