use crate::pipeline::TextStream;
use crate::Result;
use futures::TryStreamExt;

/// Join every fragment of `stream` in arrival order.
pub async fn collect_text(stream: TextStream) -> Result<String> {
    stream
        .try_fold(String::new(), |mut text, fragment| async move {
            text.push_str(&fragment);
            Ok(text)
        })
        .await
}

/// Raw-chunk cleanup for prompt output: drop `\r`, `\n` and `"`.
pub fn strip_chunk(chunk: &str) -> String {
    chunk
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '"'))
        .collect()
}
