//! Shared HTTP helpers for provider adapters.

use crate::error::ProviderError;
use crate::provider::ChunkStream;
use crate::types::StreamChunk;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use log::{debug, warn};
use serde_json::Value;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Pass successful responses through and turn others into [`ProviderError::Status`].
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("provider request failed (status={})", status.as_u16());
    Err(ProviderError::Status {
        status: status.as_u16(),
        body: clip(&extract_error_message(&body).unwrap_or(body), MAX_ERROR_BODY_CHARS),
    })
}

/// Read a successful response as JSON.
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value, ProviderError> {
    let response = check_status(response).await?;
    let text = response.text().await?;
    serde_json::from_str(&text)
        .map_err(|err| ProviderError::Decode(format!("invalid json body: {err}")))
}

/// Pull the `error.message` field out of a JSON error body.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    error_message(&value)
}

/// Error message carried inline by a JSON payload, if any.
pub(crate) fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if let Some(message) = error.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    Some("provider reported an error".to_string())
}

/// Turn an SSE response into a chunk stream using `decode` per event payload.
///
/// `decode` returns `Ok(None)` for events that carry nothing useful. The
/// `[DONE]` sentinel ends the stream.
pub(crate) fn sse_chunks<F>(response: reqwest::Response, decode: F) -> ChunkStream
where
    F: FnMut(&str) -> Result<Option<StreamChunk>, ProviderError> + Send + 'static,
{
    let events = response.bytes_stream().eventsource();
    let stream = futures_util::stream::unfold(
        (events, decode, false),
        |(mut events, mut decode, done)| async move {
            if done {
                return None;
            }
            loop {
                match events.next().await {
                    None => return None,
                    Some(Err(err)) => {
                        let err = ProviderError::Decode(format!("sse stream error: {err}"));
                        return Some((Err(err), (events, decode, true)));
                    }
                    Some(Ok(event)) => {
                        let data = event.data.trim();
                        if data.is_empty() {
                            continue;
                        }
                        if data == "[DONE]" {
                            debug!("sse stream finished");
                            return None;
                        }
                        match decode(data) {
                            Ok(Some(chunk)) => return Some((Ok(chunk), (events, decode, false))),
                            Ok(None) => continue,
                            Err(err) => return Some((Err(err), (events, decode, true))),
                        }
                    }
                }
            }
        },
    );
    Box::pin(stream)
}

pub(crate) fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars).collect();
    clipped.push_str("...");
    clipped
}
