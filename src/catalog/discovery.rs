use super::{BundlePatternMatcher, DiscoveryError, ModelCatalog};
use crate::sandbox::{evaluate_blocking, Bindings, ExpressionEvaluator};
use crate::telemetry::{DiagnosticEvent, DiagnosticSink};
use crate::transport::HttpTransport;
use futures::{stream, StreamExt};
use std::env;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_CONCURRENCY: usize = 4;

/// Finds and evaluates the model definition in the service's client bundle.
pub struct CatalogExtractor {
    transport: Arc<HttpTransport>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    diagnostics: Arc<dyn DiagnosticSink>,
    concurrency: usize,
}

impl CatalogExtractor {
    /// Download window defaults to `PLAYGROUND_DISCOVERY_CONCURRENCY` (4 when unset).
    pub fn new(
        transport: Arc<HttpTransport>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let concurrency = env::var("PLAYGROUND_DISCOVERY_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CONCURRENCY);
        Self {
            transport,
            evaluator,
            diagnostics,
            concurrency: concurrency.max(1),
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Scrape the homepage, then scan its bundle assets in order until one
    /// yields the model catalog.
    pub async fn discover(&self) -> Result<ModelCatalog, DiscoveryError> {
        let base_url = self.transport.base_url().to_string();
        self.emit(DiagnosticEvent::DiscoveryStarted {
            base_url: base_url.clone(),
        })
        .await;

        let html = self
            .transport
            .get_text("/")
            .await
            .map_err(|e| DiscoveryError::Fetch {
                url: self.transport.url_for("/"),
                reason: e.to_string(),
            })?;

        let paths = BundlePatternMatcher::extract_bundle_paths(&html);
        if paths.is_empty() {
            return Err(DiscoveryError::NoBundlePaths);
        }
        debug!(count = paths.len(), "bundle paths found");
        self.emit(DiagnosticEvent::BundlePathsFound { count: paths.len() })
            .await;

        let transport = self.transport.clone();
        let mut downloads = stream::iter(paths)
            .map(move |path| {
                let transport = transport.clone();
                async move {
                    let body = transport.get_text(&format!("/_next/{}", path)).await;
                    (path, body)
                }
            })
            .buffered(self.concurrency);

        let mut scanned = 0usize;
        while let Some((path, body)) = downloads.next().await {
            scanned += 1;
            let source = match body {
                Ok(source) => source,
                Err(e) => {
                    self.skip(&path, e.to_string()).await;
                    continue;
                }
            };

            let Some(expression) = BundlePatternMatcher::extract_model_expression(&source) else {
                continue;
            };
            debug!(path = %path, index_var = %expression.index_var, "model definition found");

            let value = match evaluate_blocking(
                self.evaluator.clone(),
                expression.resolved(),
                Bindings::new(),
            )
            .await
            {
                Ok(value) => value,
                Err(e) => {
                    self.skip(&path, e.to_string()).await;
                    continue;
                }
            };

            let catalog = match ModelCatalog::from_json(value) {
                Ok(catalog) => catalog,
                Err(e) => {
                    self.skip(&path, e.to_string()).await;
                    continue;
                }
            };
            if catalog.is_empty() {
                return Err(DiscoveryError::EmptyCatalog);
            }

            info!(models = catalog.len(), path = %path, "model catalog discovered");
            self.emit(DiagnosticEvent::CatalogReady {
                models: catalog.len(),
            })
            .await;
            return Ok(catalog);
        }

        Err(DiscoveryError::NoModelDefinition { scanned })
    }

    async fn skip(&self, path: &str, reason: String) {
        warn!(path = %path, reason = %reason, "skipping bundle asset");
        self.emit(DiagnosticEvent::AssetSkipped {
            path: path.to_string(),
            reason,
        })
        .await;
    }

    async fn emit(&self, event: DiagnosticEvent) {
        if let Err(e) = self.diagnostics.report(event).await {
            debug!(error = %e, "diagnostic sink rejected event");
        }
    }
}
