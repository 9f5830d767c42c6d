use async_trait::async_trait;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::Value;
use sidekick_rs_llm::{
    ChatProvider, ChatRequest, ChunkStream, FileState, ModelResponse, ProviderCapabilities,
    ProviderError, StagedFile, ToolCall, response_to_chunk,
};
use sidekick_rs_protocol::AttachmentKind;
use std::collections::VecDeque;
use std::path::Path;

/// Capabilities of a provider that inlines images and PDFs and stages everything.
pub fn gemini_like_capabilities() -> ProviderCapabilities {
    ProviderCapabilities {
        tools: true,
        streaming: true,
        inline_kinds: vec![AttachmentKind::Image, AttachmentKind::Pdf],
        staged_kinds: vec![
            AttachmentKind::Image,
            AttachmentKind::Pdf,
            AttachmentKind::Video,
        ],
        always_staged_kinds: vec![AttachmentKind::Video],
    }
}

pub fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

/// Provider that replays scripted responses and records every request.
///
/// Streaming splits response text into word-sized chunks. Once the script is
/// exhausted every call fails.
pub struct ScriptedProvider {
    id: String,
    model: String,
    capabilities: ProviderCapabilities,
    responses: Mutex<VecDeque<ModelResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
    file_states: Mutex<VecDeque<FileState>>,
    staged: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            id: "scripted".to_string(),
            model: "scripted-model".to_string(),
            capabilities: gemini_like_capabilities(),
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            file_states: Mutex::new(VecDeque::new()),
            staged: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// States reported by upload and status polls, in order; `Active` once drained.
    pub fn with_file_states(self, states: Vec<FileState>) -> Self {
        *self.file_states.lock() = states.into();
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// Display names of staged uploads.
    pub fn staged_files(&self) -> Vec<String> {
        self.staged.lock().clone()
    }

    pub fn deleted_files(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    fn next_state(&self) -> FileState {
        self.file_states
            .lock()
            .pop_front()
            .unwrap_or(FileState::Active)
    }

    fn staged_file(&self, name: &str, mime_type: &str) -> StagedFile {
        StagedFile {
            name: name.to_string(),
            uri: format!("https://files.test/{name}"),
            mime_type: mime_type.to_string(),
            state: self.next_state(),
            expires_at: None,
        }
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities.clone()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ModelResponse, ProviderError> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| ProviderError::Decode("no scripted response left".to_string()))
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ProviderError> {
        let response = self.chat(request).await?;
        let mut chunks: Vec<Result<_, ProviderError>> = response
            .text
            .split_inclusive(' ')
            .map(|word| {
                Ok(response_to_chunk(ModelResponse {
                    text: word.to_string(),
                    ..ModelResponse::default()
                }))
            })
            .collect();
        chunks.push(Ok(response_to_chunk(ModelResponse {
            text: String::new(),
            ..response
        })));
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn stage_file(
        &self,
        _path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> Result<StagedFile, ProviderError> {
        let name = {
            let mut staged = self.staged.lock();
            staged.push(display_name.to_string());
            format!("files/{}", staged.len())
        };
        Ok(self.staged_file(&name, mime_type))
    }

    async fn file_status(&self, name: &str) -> Result<StagedFile, ProviderError> {
        Ok(self.staged_file(name, "application/octet-stream"))
    }

    async fn delete_staged_file(&self, name: &str) -> Result<(), ProviderError> {
        self.deleted.lock().push(name.to_string());
        Ok(())
    }
}

/// Provider whose every call fails with an HTTP status error.
pub struct FailingProvider {
    status: u16,
    body: String,
}

impl FailingProvider {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[async_trait]
impl ChatProvider for FailingProvider {
    fn id(&self) -> &str {
        "failing"
    }

    fn model(&self) -> &str {
        "failing-model"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::text_only()
    }

    async fn chat(&self, _request: &ChatRequest) -> Result<ModelResponse, ProviderError> {
        Err(ProviderError::Status {
            status: self.status,
            body: self.body.clone(),
        })
    }
}
