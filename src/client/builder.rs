use crate::catalog::{CatalogExtractor, ModelCatalog};
use crate::client::core::PlaygroundClient;
use crate::sandbox::{ExpressionEvaluator, Sandbox, SandboxLimits};
use crate::transport::{HttpTransport, TransportConfig};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`PlaygroundClient`].
///
/// Unset options fall back to the `PLAYGROUND_*` environment variables.
pub struct PlaygroundClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    proxy_url: Option<String>,
    user_agent: Option<String>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    sandbox_limits: Option<SandboxLimits>,
    diagnostics: Arc<dyn crate::telemetry::DiagnosticSink>,
    discovery_concurrency: Option<usize>,
    catalog: Option<ModelCatalog>,
}

impl PlaygroundClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: None,
            proxy_url: None,
            user_agent: None,
            evaluator: None,
            sandbox_limits: None,
            diagnostics: crate::telemetry::noop_sink(),
            discovery_concurrency: None,
            catalog: None,
        }
    }

    /// Service base URL (default `https://sdk.vercel.ai`). Mostly for mock servers.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self
    }

    /// Fix the User-Agent instead of randomizing it.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Replace the built-in sandbox.
    pub fn evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn sandbox_limits(mut self, limits: SandboxLimits) -> Self {
        self.sandbox_limits = Some(limits);
        self
    }

    /// Inject a diagnostic sink. Default is a no-op sink.
    pub fn diagnostic_sink(mut self, sink: Arc<dyn crate::telemetry::DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn discovery_concurrency(mut self, n: usize) -> Self {
        self.discovery_concurrency = Some(n.max(1));
        self
    }

    /// Start from a known catalog and skip background discovery.
    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Build the client. Unless a catalog was supplied, discovery is spawned
    /// on the current runtime.
    pub async fn build(self) -> Result<PlaygroundClient> {
        let mut config = TransportConfig::from_env_with_base(self.base_url.as_deref())?;
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if self.proxy_url.is_some() {
            config.proxy_url = self.proxy_url;
        }
        if self.user_agent.is_some() {
            config.user_agent = self.user_agent;
        }
        let transport = Arc::new(HttpTransport::new(&config)?);

        let evaluator: Arc<dyn ExpressionEvaluator> = match self.evaluator {
            Some(evaluator) => evaluator,
            None => Arc::new(Sandbox::new(
                self.sandbox_limits.unwrap_or_else(SandboxLimits::from_env),
            )),
        };

        let mut extractor =
            CatalogExtractor::new(transport.clone(), evaluator.clone(), self.diagnostics.clone());
        if let Some(n) = self.discovery_concurrency {
            extractor = extractor.with_concurrency(n);
        }

        let discover = self.catalog.is_none();
        let client = PlaygroundClient::from_parts(
            transport,
            evaluator,
            self.diagnostics,
            extractor,
            self.catalog,
        );
        if discover {
            client.spawn_discovery();
        }
        Ok(client)
    }
}

impl Default for PlaygroundClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
