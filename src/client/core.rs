use crate::catalog::{CatalogExtractor, DefaultParams, DiscoveryError, ModelCatalog};
use crate::sandbox::ExpressionEvaluator;
use crate::telemetry::{DiagnosticEvent, DiagnosticSink};
use crate::token::{Token, TokenMinter};
use crate::transport::HttpTransport;
use crate::{Error, Result};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Catalog discovery state as observed by waiters.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Pending,
    Ready,
    Failed(DiscoveryError),
}

pub(crate) struct ClientInner {
    pub(crate) transport: Arc<HttpTransport>,
    pub(crate) evaluator: Arc<dyn ExpressionEvaluator>,
    pub(crate) diagnostics: Arc<dyn DiagnosticSink>,
    pub(crate) extractor: CatalogExtractor,
    pub(crate) minter: TokenMinter,
    catalog: ArcSwapOption<ModelCatalog>,
    readiness: watch::Sender<Readiness>,
}

/// Client for the playground service. Cheap to clone; clones share the
/// catalog and the connection pool.
#[derive(Clone)]
pub struct PlaygroundClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl PlaygroundClient {
    /// Client with env-derived defaults; discovery starts immediately.
    pub async fn new() -> Result<Self> {
        crate::client::builder::PlaygroundClientBuilder::new()
            .build()
            .await
    }

    pub fn builder() -> crate::client::builder::PlaygroundClientBuilder {
        crate::client::builder::PlaygroundClientBuilder::new()
    }

    pub(crate) fn from_parts(
        transport: Arc<HttpTransport>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        diagnostics: Arc<dyn DiagnosticSink>,
        extractor: CatalogExtractor,
        catalog: Option<ModelCatalog>,
    ) -> Self {
        let minter = TokenMinter::new(transport.clone(), evaluator.clone(), diagnostics.clone());
        let initial = if catalog.is_some() {
            Readiness::Ready
        } else {
            Readiness::Pending
        };
        let (readiness, _) = watch::channel(initial);
        Self {
            inner: Arc::new(ClientInner {
                transport,
                evaluator,
                diagnostics,
                extractor,
                minter,
                catalog: ArcSwapOption::new(catalog.map(Arc::new)),
                readiness,
            }),
        }
    }

    /// Start background discovery.
    pub(crate) fn spawn_discovery(&self) {
        let client = self.clone();
        tokio::spawn(async move {
            // Failures are recorded in the readiness state.
            let _ = client.refresh_catalog().await;
        });
    }

    pub fn transport(&self) -> &Arc<HttpTransport> {
        &self.inner.transport
    }

    pub fn evaluator(&self) -> &Arc<dyn ExpressionEvaluator> {
        &self.inner.evaluator
    }

    pub fn readiness(&self) -> Readiness {
        self.inner.readiness.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.catalog.load().is_some()
    }

    /// The catalog if discovery has finished; never waits.
    pub fn try_catalog(&self) -> Result<Arc<ModelCatalog>> {
        if let Some(catalog) = self.inner.catalog.load_full() {
            return Ok(catalog);
        }
        match self.readiness() {
            Readiness::Failed(e) => Err(Error::Discovery(e)),
            _ => Err(Error::NotReady),
        }
    }

    /// Wait for discovery to finish.
    pub async fn await_ready(&self) -> Result<Arc<ModelCatalog>> {
        let mut rx = self.inner.readiness.subscribe();
        let state = rx
            .wait_for(|state| *state != Readiness::Pending)
            .await
            .map_err(|_| Error::NotReady)?
            .clone();
        match state {
            Readiness::Failed(e) => Err(Error::Discovery(e)),
            _ => self.try_catalog(),
        }
    }

    /// Run discovery again and swap the catalog in on success.
    ///
    /// A failed refresh leaves an existing catalog in place.
    pub async fn refresh_catalog(&self) -> Result<Arc<ModelCatalog>> {
        match self.inner.extractor.discover().await {
            Ok(catalog) => {
                let catalog = Arc::new(catalog);
                info!(models = catalog.len(), "model catalog ready");
                self.inner.catalog.store(Some(catalog.clone()));
                self.inner.readiness.send_replace(Readiness::Ready);
                Ok(catalog)
            }
            Err(e) => {
                warn!(error = %e, "model catalog discovery failed");
                self.emit(DiagnosticEvent::DiscoveryFailed {
                    reason: e.to_string(),
                })
                .await;
                if self.inner.catalog.load().is_none() {
                    self.inner
                        .readiness
                        .send_replace(Readiness::Failed(e.clone()));
                }
                Err(Error::Discovery(e))
            }
        }
    }

    /// Discovered model ids, sorted.
    pub async fn model_ids(&self) -> Result<Vec<String>> {
        let catalog = self.await_ready().await?;
        Ok(catalog.model_ids().map(str::to_string).collect())
    }

    pub async fn default_params(&self, model_id: &str) -> Result<DefaultParams> {
        self.await_ready()
            .await?
            .default_params(model_id)
            .ok_or_else(|| Error::unknown_model(model_id))
    }

    /// Mint a single token. Generation calls do this themselves.
    pub async fn mint_token(&self) -> Result<Token> {
        Ok(self.inner.minter.mint().await?)
    }

    pub(crate) async fn emit(&self, event: DiagnosticEvent) {
        if let Err(e) = self.inner.diagnostics.report(event).await {
            tracing::debug!(error = %e, "diagnostic sink rejected event");
        }
    }
}
