//! Merging of streamed chunks into one response.

use crate::error::ProviderError;
use crate::provider::ChunkStream;
use crate::types::{ModelResponse, StreamChunk, TokenUsage, ToolCall};
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Accumulates [`StreamChunk`]s into a [`ModelResponse`].
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    text: String,
    calls: BTreeMap<usize, PartialCall>,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a chunk, returning its text delta if it carried any.
    pub fn push(&mut self, chunk: StreamChunk) -> Option<String> {
        for delta in chunk.tool_calls {
            let call = self.calls.entry(delta.index).or_default();
            if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                call.id = Some(id);
            }
            if let Some(name) = delta.name {
                call.name.push_str(&name);
            }
            if let Some(arguments) = delta.arguments {
                call.arguments.push_str(&arguments);
            }
        }
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
        let text = chunk.text.filter(|text| !text.is_empty())?;
        self.text.push_str(&text);
        Some(text)
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Produce the merged response.
    ///
    /// Argument text that is not valid JSON is kept as a string so the
    /// executor can report it to the model.
    pub fn finish(self) -> ModelResponse {
        let tool_calls = self
            .calls
            .into_iter()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, call)| ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{index}")),
                name: call.name,
                arguments: parse_arguments(&call.arguments),
            })
            .collect();
        ModelResponse {
            text: self.text,
            tool_calls,
            finish_reason: self.finish_reason,
            usage: self.usage,
        }
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Drain a chunk stream, calling `on_delta` for each text delta.
pub async fn collect_stream<F>(
    mut stream: ChunkStream,
    mut on_delta: F,
) -> Result<ModelResponse, ProviderError>
where
    F: FnMut(&str) + Send,
{
    let mut accumulator = ResponseAccumulator::new();
    while let Some(chunk) = stream.next().await {
        if let Some(delta) = accumulator.push(chunk?) {
            on_delta(&delta);
        }
    }
    Ok(accumulator.finish())
}

#[cfg(test)]
mod tests {
    use super::{ResponseAccumulator, collect_stream};
    use crate::error::ProviderError;
    use crate::provider::ChunkStream;
    use crate::types::{StreamChunk, ToolCallDelta};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> StreamChunk {
        StreamChunk {
            tool_calls: vec![ToolCallDelta {
                index,
                id: id.map(str::to_string),
                name: name.map(str::to_string),
                arguments: Some(args.to_string()),
            }],
            ..StreamChunk::default()
        }
    }

    #[test]
    fn merges_fragmented_tool_calls() {
        let mut acc = ResponseAccumulator::new();
        acc.push(delta(0, Some("call_a"), Some("baidu_search"), "{\"que"));
        acc.push(delta(0, None, None, "ry\":\"rust\"}"));
        acc.push(StreamChunk {
            finish_reason: Some("tool_calls".to_string()),
            ..StreamChunk::default()
        });
        let response = acc.finish();
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "call_a");
        assert_eq!(response.tool_calls[0].arguments, json!({ "query": "rust" }));
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn keeps_broken_arguments_as_text() {
        let mut acc = ResponseAccumulator::new();
        acc.push(delta(2, None, Some("get_system_time"), "{\"timezone\":"));
        let response = acc.finish();
        assert_eq!(response.tool_calls[0].id, "call_2");
        assert_eq!(response.tool_calls[0].arguments, json!("{\"timezone\":"));
    }

    #[tokio::test]
    async fn collect_stream_reports_deltas() {
        let chunks = vec![
            Ok(StreamChunk {
                text: Some("Hel".to_string()),
                ..StreamChunk::default()
            }),
            Ok(StreamChunk {
                text: Some("lo".to_string()),
                ..StreamChunk::default()
            }),
        ];
        let stream: ChunkStream = Box::pin(futures_util::stream::iter(chunks));
        let mut seen = Vec::new();
        let response = collect_stream(stream, |delta| seen.push(delta.to_string()))
            .await
            .expect("collect");
        assert_eq!(response.text, "Hello");
        assert_eq!(seen, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn collect_stream_propagates_errors() {
        let chunks = vec![Err(ProviderError::Decode("bad chunk".to_string()))];
        let stream: ChunkStream = Box::pin(futures_util::stream::iter(chunks));
        let err = collect_stream(stream, |_| {}).await.expect_err("error");
        assert!(matches!(err, ProviderError::Decode(_)));
    }
}
