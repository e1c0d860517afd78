//! Diagnostic callbacks.
//!
//! The client reports discovery progress, readiness, token minting and
//! upstream calls as typed [`DiagnosticEvent`]s to an application-supplied
//! [`DiagnosticSink`]. Nothing is collected unless a sink is installed.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`DiagnosticEvent`] | Typed event enum |
//! | [`DiagnosticSink`] | Trait for event destinations |
//! | [`NoopSink`] | Default sink (drops everything) |
//! | [`TracingSink`] | Forwards events to `tracing` |
//! | [`InMemorySink`] | Bounded in-memory sink for tests |

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

fn timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Typed diagnostic events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    DiscoveryStarted { base_url: String },
    BundlePathsFound { count: usize },
    AssetSkipped { path: String, reason: String },
    CatalogReady { models: usize },
    DiscoveryFailed { reason: String },
    TokenMinted { elapsed_ms: u64 },
    UpstreamRequest { endpoint: String, model: String },
}

/// An event plus the wall-clock time it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub event: DiagnosticEvent,
    pub timestamp: f64,
}

#[async_trait]
pub trait DiagnosticSink: Send + Sync {
    async fn report(&self, event: DiagnosticEvent) -> Result<()>;
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// No-op sink (always available).
pub struct NoopSink;

#[async_trait]
impl DiagnosticSink for NoopSink {
    async fn report(&self, _: DiagnosticEvent) -> Result<()> {
        Ok(())
    }
}

/// Returns a no-op diagnostic sink.
pub fn noop_sink() -> Arc<dyn DiagnosticSink> {
    Arc::new(NoopSink)
}

/// Logs every event at `debug` through `tracing`.
pub struct TracingSink;

#[async_trait]
impl DiagnosticSink for TracingSink {
    async fn report(&self, event: DiagnosticEvent) -> Result<()> {
        tracing::debug!(?event, "diagnostic");
        Ok(())
    }
}

/// In-memory sink for testing.
pub struct InMemorySink {
    events: Arc<RwLock<Vec<RecordedEvent>>>,
    max_events: usize,
}

impl InMemorySink {
    pub fn new(max: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            max_events: max.max(1),
        }
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.recorded().into_iter().map(|r| r.event).collect()
    }

    pub fn recorded(&self) -> Vec<RecordedEvent> {
        self.events
            .read()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DiagnosticSink for InMemorySink {
    async fn report(&self, event: DiagnosticEvent) -> Result<()> {
        if let Ok(mut events) = self.events.write() {
            events.push(RecordedEvent {
                event,
                timestamp: timestamp(),
            });
            if events.len() > self.max_events {
                events.remove(0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_sink_is_bounded() {
        let sink = InMemorySink::new(2);
        for count in 0..3 {
            sink.report(DiagnosticEvent::BundlePathsFound { count })
                .await
                .unwrap();
        }
        assert_eq!(
            sink.events(),
            vec![
                DiagnosticEvent::BundlePathsFound { count: 1 },
                DiagnosticEvent::BundlePathsFound { count: 2 },
            ]
        );
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let json = serde_json::to_value(DiagnosticEvent::CatalogReady { models: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({"event": "catalog_ready", "models": 3}));
    }
}
