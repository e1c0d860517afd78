//! # ai-playground-rust
//!
//! Unofficial client and OpenAI-compatible proxy for the hosted AI playground
//! at `sdk.vercel.ai`.
//!
//! ## Overview
//!
//! The playground has no public API. This crate reproduces the three things a
//! browser session does to talk to it:
//!
//! - **Model discovery**: scrape the client bundle for the model table and
//!   evaluate it in a sandbox ([`catalog`]).
//! - **Token minting**: solve the per-request challenge served at
//!   `/openai.jpeg` ([`token`], [`codec`], [`sandbox`]).
//! - **Stream normalization**: decode the chunked text and NDJSON responses
//!   into text fragments ([`pipeline`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_playground_rust::{Message, PlaygroundClient};
//!
//! #[tokio::main]
//! async fn main() -> ai_playground_rust::Result<()> {
//!     let client = PlaygroundClient::new().await?;
//!     client.await_ready().await?;
//!
//!     let reply = client
//!         .request("openai:gpt-3.5-turbo")
//!         .temperature(0.2)
//!         .chat_text(vec![Message::user("Hello!")])
//!         .await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client, builder and generation calls |
//! | [`catalog`] | Model catalog and bundle discovery |
//! | [`token`] | Challenge decoding and token minting |
//! | [`sandbox`] | Capability-limited expression evaluator |
//! | [`codec`] | UTF-16 base64 transform |
//! | [`protocol`] | Upstream request construction |
//! | [`pipeline`] | Response stream decoders |
//! | [`transport`] | HTTP transport with browser-like headers |
//! | [`telemetry`] | Diagnostic event sinks |
//! | `server` | OpenAI-compatible HTTP front end (feature `server`) |

pub mod catalog;
pub mod client;
pub mod codec;
pub mod pipeline;
pub mod protocol;
pub mod sandbox;
pub mod telemetry;
pub mod token;
pub mod transport;
pub mod types;

#[cfg(feature = "server")]
pub mod server;

// Re-export main types for convenience
pub use catalog::{DefaultParams, DiscoveryError, ModelCatalog, ModelSpec, ParamDescriptor};
pub use client::{GenerationBuilder, PlaygroundClient, PlaygroundClientBuilder, Readiness};
pub use pipeline::{collect_text, TextStream};
pub use protocol::{GenerationRequest, RequestTranslator};
pub use sandbox::{Bindings, ExpressionEvaluator, Sandbox, SandboxError, SandboxLimits};
pub use telemetry::{DiagnosticEvent, DiagnosticSink};
pub use token::{Token, TokenError, TokenMinter};
pub use transport::TransportError;
pub use types::message::{Message, MessageRole};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A specialized Result for pipeline operations
pub type PipeResult<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `PipeResult<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = PipeResult<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
