//! Streaming decoders (Bytes -> text fragments)

use crate::pipeline::{accumulate::strip_chunk, Decoder, TextStream};
use crate::{BoxStream, PipeResult};
use bytes::Bytes;
use futures::{stream, StreamExt};

/// UTF-8 decoding that holds back a sequence split across chunk boundaries.
#[derive(Debug, Default)]
pub(crate) struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decode as much of `pending + bytes` as forms complete characters.
    /// Invalid sequences become U+FFFD; an incomplete tail is kept.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // valid_up_to() marks a char boundary
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Whatever is left at end of stream, lossily.
    pub(crate) fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Plain text passthrough. No reformatting; empty fragments are skipped.
pub struct TextDecoder;

#[async_trait::async_trait]
impl Decoder for TextDecoder {
    async fn decode_stream(&self, input: BoxStream<'static, Bytes>) -> PipeResult<TextStream> {
        let stream = stream::unfold(
            (input, Utf8Carry::default(), false),
            |(mut input, mut carry, done)| async move {
                if done {
                    return None;
                }
                loop {
                    match input.next().await {
                        Some(Ok(bytes)) => {
                            let text = carry.push(&bytes);
                            if !text.is_empty() {
                                return Some((Ok(text), (input, carry, false)));
                            }
                        }
                        Some(Err(e)) => return Some((Err(e), (input, carry, true))),
                        None => {
                            let rest = carry.finish();
                            if rest.is_empty() {
                                return None;
                            }
                            return Some((Ok(rest), (input, carry, true)));
                        }
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }
}

/// Newline-delimited JSON string literals, one fragment per line.
///
/// Empty lines are dropped. A line that does not parse as a JSON string is
/// forwarded with `\r`, `\n` and `"` stripped instead of failing the stream.
pub struct JsonStringLineDecoder;

impl JsonStringLineDecoder {
    pub fn decode_line(line: &str) -> Option<String> {
        let trimmed = line.trim_end_matches('\r');
        if trimmed.trim().is_empty() {
            return None;
        }
        let fragment = match serde_json::from_str::<String>(trimmed.trim()) {
            Ok(decoded) => decoded,
            Err(_) => {
                tracing::debug!(line = %trimmed, "non-JSON line in prompt stream");
                strip_chunk(trimmed)
            }
        };
        if fragment.is_empty() {
            None
        } else {
            Some(fragment)
        }
    }
}

#[async_trait::async_trait]
impl Decoder for JsonStringLineDecoder {
    async fn decode_stream(&self, input: BoxStream<'static, Bytes>) -> PipeResult<TextStream> {
        let stream = stream::unfold(
            (input, Utf8Carry::default(), String::new(), false),
            |(mut input, mut carry, mut buf, mut eof)| async move {
                loop {
                    if let Some(idx) = buf.find('\n') {
                        let line: String = buf.drain(..=idx).collect();
                        if let Some(fragment) = JsonStringLineDecoder::decode_line(&line[..idx]) {
                            return Some((Ok(fragment), (input, carry, buf, eof)));
                        }
                        continue;
                    }

                    if eof {
                        // Final line without a trailing newline.
                        let line = std::mem::take(&mut buf);
                        return JsonStringLineDecoder::decode_line(&line)
                            .map(|fragment| (Ok(fragment), (input, carry, buf, eof)));
                    }

                    match input.next().await {
                        Some(Ok(bytes)) => buf.push_str(&carry.push(&bytes)),
                        Some(Err(e)) => {
                            // Stop after surfacing the error.
                            buf.clear();
                            return Some((Err(e), (input, carry, buf, true)));
                        }
                        None => {
                            buf.push_str(&carry.finish());
                            eof = true;
                        }
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }
}
