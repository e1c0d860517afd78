//! Upstream request shapes.
//!
//! The playground has two generation endpoints: `/api/generate` for
//! conversations and `/api/prompt` for single prompts. Both take the model's
//! default parameters merged with the caller's overrides, flattened into the
//! top level of the JSON body. [`RequestTranslator`] owns that merge and the
//! per-endpoint extras.

pub mod request;

pub use request::{merge_params, GenerationKind, GenerationRequest, RequestTranslator};

pub const CHAT_ENDPOINT: &str = "/api/generate";
pub const PROMPT_ENDPOINT: &str = "/api/prompt";
