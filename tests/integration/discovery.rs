//! Catalog discovery against mocked bundle assets

use crate::integration::mock_server::{MockServerFixture, HOMEPAGE, MODELS_ASSET, MODELS_SOURCE, WEBPACK_ASSET};
use ai_playground_rust::telemetry::DiagnosticEvent;
use ai_playground_rust::{DiscoveryError, Error, Readiness};
use serde_json::{json, Value};
use std::io::Write;
use std::time::Duration;

#[tokio::test]
async fn discovers_models_and_defaults() {
    let fixture = MockServerFixture::new().await;
    let _mocks = fixture.mock_bundle().await;

    let client = fixture.create_client().await.unwrap();
    let catalog = client.await_ready().await.unwrap();

    assert_eq!(
        catalog.model_ids().collect::<Vec<_>>(),
        vec!["anthropic:claude-v1", "openai:gpt-3.5-turbo"]
    );
    let spec = catalog.get("openai:gpt-3.5-turbo").unwrap();
    assert_eq!(spec.provider.as_deref(), Some("openai"));
    assert_eq!(spec.extra["enabled"], json!(true));
    assert_eq!(spec.parameters["temperature"].metadata["range"], json!([0, 2]));

    let defaults = client.default_params("anthropic:claude-v1").await.unwrap();
    assert_eq!(
        Value::Object(defaults),
        json!({ "maximumLength": 200, "stopSequences": ["\n\nHuman:"], "temperature": 1 })
    );
    assert_eq!(client.readiness(), Readiness::Ready);
    assert!(client.try_catalog().is_ok());

    let events = fixture.diagnostics.events();
    assert!(events.contains(&DiagnosticEvent::BundlePathsFound { count: 2 }));
    assert!(events.contains(&DiagnosticEvent::CatalogReady { models: 2 }));
}

#[tokio::test]
async fn homepage_without_bundle_paths_fails_loudly() {
    let fixture = MockServerFixture::new().await;
    let _home = fixture.mock_get("/", 200, "<html><body>maintenance</body></html>").await;

    let client = fixture.create_client().await.unwrap();
    let err = client.await_ready().await.unwrap_err();
    assert!(matches!(err, Error::Discovery(DiscoveryError::NoBundlePaths)));
    assert!(matches!(
        client.try_catalog(),
        Err(Error::Discovery(DiscoveryError::NoBundlePaths))
    ));
    assert!(matches!(client.readiness(), Readiness::Failed(_)));
}

#[tokio::test]
async fn bundle_without_model_definition_is_an_error() {
    let fixture = MockServerFixture::new().await;
    let _home = fixture.mock_get("/", 200, HOMEPAGE).await;
    let _a = fixture
        .mock_get(&format!("/_next/{}", WEBPACK_ASSET), 200, "var a=1;")
        .await;
    let _b = fixture
        .mock_get(&format!("/_next/{}", MODELS_ASSET), 200, "var b=2;")
        .await;

    let client = fixture.create_client().await.unwrap();
    let err = client.await_ready().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Discovery(DiscoveryError::NoModelDefinition { scanned: 2 })
    ));
}

#[tokio::test]
async fn failed_asset_downloads_are_skipped() {
    let fixture = MockServerFixture::new().await;
    let _home = fixture.mock_get("/", 200, HOMEPAGE).await;
    let _a = fixture
        .mock_get(&format!("/_next/{}", WEBPACK_ASSET), 404, "not found")
        .await;
    let _b = fixture
        .mock_get(&format!("/_next/{}", MODELS_ASSET), 200, MODELS_SOURCE)
        .await;

    let client = fixture.create_client().await.unwrap();
    let catalog = client.await_ready().await.unwrap();
    assert_eq!(catalog.len(), 2);

    let skipped: Vec<_> = fixture
        .diagnostics
        .events()
        .into_iter()
        .filter(|e| matches!(e, DiagnosticEvent::AssetSkipped { .. }))
        .collect();
    assert_eq!(skipped.len(), 1);
}

#[tokio::test]
async fn homepage_fetch_failure_is_reported() {
    let fixture = MockServerFixture::new().await;
    let _home = fixture.mock_get("/", 503, "down").await;

    let client = fixture.create_client().await.unwrap();
    let err = client.await_ready().await.unwrap_err();
    assert!(matches!(err, Error::Discovery(DiscoveryError::Fetch { .. })));
}

#[tokio::test]
async fn catalog_is_not_ready_while_discovery_runs() {
    let fixture = MockServerFixture::new().await;
    let _home = {
        let mut server = fixture.server.lock().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(300));
                w.write_all(b"<html></html>")
            })
            .create_async()
            .await
    };

    let client = fixture.create_client().await.unwrap();
    assert!(matches!(client.try_catalog(), Err(Error::NotReady)));
    assert_eq!(client.readiness(), Readiness::Pending);
    assert!(client.await_ready().await.is_err());
}

#[tokio::test]
async fn refresh_keeps_the_previous_catalog_on_failure() {
    let fixture = MockServerFixture::new().await;
    let mocks = fixture.mock_bundle().await;

    let client = fixture.create_client().await.unwrap();
    let first = client.await_ready().await.unwrap();

    for mock in mocks {
        mock.remove_async().await;
    }
    let _home = fixture.mock_get("/", 200, "<html></html>").await;

    assert!(client.refresh_catalog().await.is_err());
    let current = client.try_catalog().unwrap();
    assert_eq!(current.len(), first.len());
    assert_eq!(client.readiness(), Readiness::Ready);
}
