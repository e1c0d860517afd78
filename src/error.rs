use crate::catalog::DiscoveryError;
use crate::token::TokenError;
use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "request.messages", "PLAYGROUND_BASE_URL")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "request_translator", "client_builder")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the playground client.
///
/// Every failure reaches the caller as a distinct variant so a front end can
/// map it to an external status; nothing here is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Model catalog discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Token minting failed: {0}")]
    Token(#[from] TokenError),

    #[error("Unknown model: {model}")]
    UnknownModel { model: String },

    #[error("Upstream error: HTTP {status} from {endpoint}: {body}")]
    Upstream {
        status: u16,
        endpoint: String,
        body: String,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Model catalog is not ready yet")]
    NotReady,

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn unknown_model(model: impl Into<String>) -> Self {
        Error::UnknownModel {
            model: model.into(),
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Validation { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_rendered_in_display() {
        let err = Error::validation_with_context(
            "messages must not be empty",
            ErrorContext::new()
                .with_field_path("request.messages")
                .with_source("request_translator"),
        );
        assert_eq!(
            err.to_string(),
            "Validation error: messages must not be empty (field: request.messages, source: request_translator)"
        );
        assert!(err.context().is_some());
    }

    #[test]
    fn upstream_error_mentions_status_and_endpoint() {
        let err = Error::Upstream {
            status: 429,
            endpoint: "/api/generate".into(),
            body: "slow down".into(),
        };
        assert_eq!(
            err.to_string(),
            "Upstream error: HTTP 429 from /api/generate: slow down"
        );
        assert!(Error::unknown_model("x").context().is_none());
    }
}
