//! The provider adapter interface.

use crate::error::ProviderError;
use crate::types::{
    ChatRequest, ModelResponse, ProviderCapabilities, StagedFile, StreamChunk, ToolCallDelta,
};
use async_trait::async_trait;
use futures_util::Stream;
use std::path::Path;
use std::pin::Pin;

/// Stream of decoded chunks from a streaming completion.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// A chat model backend.
///
/// Implementations translate [`ChatRequest`] into their wire format and
/// normalize replies into [`ModelResponse`] and [`StreamChunk`].
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider id, e.g. `gemini`.
    fn id(&self) -> &str;

    /// Model name requests are sent to.
    fn model(&self) -> &str;

    /// Attachment, tool, and streaming support.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Run a non-streaming completion.
    async fn chat(&self, request: &ChatRequest) -> Result<ModelResponse, ProviderError>;

    /// Run a streaming completion.
    ///
    /// The default runs [`ChatProvider::chat`] and yields its result as one chunk.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ProviderError> {
        let response = self.chat(request).await?;
        let chunk = response_to_chunk(response);
        Ok(Box::pin(futures_util::stream::iter(vec![Ok(chunk)])))
    }

    /// Upload a local file to provider storage.
    async fn stage_file(
        &self,
        _path: &Path,
        _display_name: &str,
        _mime_type: &str,
    ) -> Result<StagedFile, ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "{} has no file storage",
            self.id()
        )))
    }

    /// Fetch the processing state of a staged file.
    async fn file_status(&self, _name: &str) -> Result<StagedFile, ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "{} has no file storage",
            self.id()
        )))
    }

    /// Delete a staged file.
    async fn delete_staged_file(&self, _name: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "{} has no file storage",
            self.id()
        )))
    }
}

/// Express a complete response as a single stream chunk.
pub fn response_to_chunk(response: ModelResponse) -> StreamChunk {
    StreamChunk {
        text: (!response.text.is_empty()).then_some(response.text),
        tool_calls: response
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(index, call)| ToolCallDelta {
                index,
                id: Some(call.id),
                name: Some(call.name),
                arguments: Some(match call.arguments {
                    serde_json::Value::String(raw) => raw,
                    other => other.to_string(),
                }),
            })
            .collect(),
        finish_reason: response.finish_reason,
        usage: response.usage,
    }
}
