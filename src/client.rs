//! Playground client.
//!
//! A [`PlaygroundClient`] is returned before the model catalog exists;
//! discovery runs in the background and [`PlaygroundClient::await_ready`]
//! resolves once it finishes. Generation calls wait for readiness, then mint
//! a fresh token, build the upstream body and stream the decoded response.

pub mod builder;
pub mod chat;
pub mod core;

pub use builder::PlaygroundClientBuilder;
pub use chat::GenerationBuilder;
pub use core::{PlaygroundClient, Readiness};
