//! Stream normalization.
//!
//! Upstream responses arrive as chunked bytes. The conversational endpoint
//! streams plain text; the single-prompt endpoint streams one JSON string
//! literal per line. A [`Decoder`] turns either into a [`TextStream`] of
//! fragments in arrival order, and [`collect_text`] joins a stream into the
//! full answer.
//!
//! ```text
//! Raw Bytes → Decoder → text fragments → (optional) collect_text
//!               │
//!         TextDecoder | JsonStringLineDecoder
//! ```
//!
//! Streams are pull-based: nothing is read from the connection while the
//! consumer is not polling, and dropping the stream closes it.

pub mod accumulate;
pub mod decode;


pub use accumulate::{collect_text, strip_chunk};
pub use decode::{JsonStringLineDecoder, TextDecoder};

use crate::{BoxStream, PipeResult};
use bytes::Bytes;

/// Decoded text fragments.
pub type TextStream = BoxStream<'static, String>;

/// Wire format of a generation response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// Raw UTF-8 text (`/api/generate`).
    Text,
    /// Newline-delimited JSON string literals (`/api/prompt`).
    JsonStringLines,
}

#[async_trait::async_trait]
pub trait Decoder: Send + Sync {
    async fn decode_stream(&self, input: BoxStream<'static, Bytes>) -> PipeResult<TextStream>;
}

/// Decoder for a response format.
pub fn decoder_for(format: StreamFormat) -> Box<dyn Decoder> {
    match format {
        StreamFormat::Text => Box::new(TextDecoder),
        StreamFormat::JsonStringLines => Box::new(JsonStringLineDecoder),
    }
}
