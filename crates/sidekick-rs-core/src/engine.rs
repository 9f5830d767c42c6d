//! Chat turn execution.
//!
//! A turn sends the conversation and tool declarations to the provider. If
//! the model asks for a tool, exactly one call runs, its result is appended,
//! and the model is asked once more without tools for the final answer.

use crate::attachments::{AttachmentPlanner, StagedFileCache, history_attachment};
use crate::error::SidekickCoreError;
use crate::prompt::build_system_prompt;
use crate::sessions::SessionStore;
use crate::titles::{parse_title_reply, suggest_title, title_request};
use crate::tool_messages::ensure_tool_results;
use crate::types::{Message, SessionId};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sidekick_rs_config::SidekickConfig;
use sidekick_rs_llm::{
    ChatMessage, ChatProvider, ChatRequest, ModelResponse, ProviderCapabilities, ToolCall,
    ToolDeclaration, ToolResult, collect_stream,
};
use sidekick_rs_protocol::{EventMsg, EventPayload, EventSink, Role, TurnId};
use sidekick_rs_tools::{
    ToolExecutor, ToolOutcome, ToolOutputPolicy, ToolRegistry, ToolSpec, TurnServices,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

const TURN_STREAM_BUFFER: usize = 512;
const SKIPPED_CALL_ERROR: &str = "only one tool call runs per turn; this call was skipped";

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    /// Final assistant text.
    pub response: String,
    /// Outcome of the tool call, when the model requested one.
    pub tool_outcome: Option<ToolOutcome>,
    /// Title assigned to the session by this turn.
    pub title: Option<String>,
}

/// Streaming handle for a turn running on a background task.
pub struct TurnStream {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    /// Events emitted while the turn runs.
    pub events: BroadcastStream<EventMsg>,
    handle: JoinHandle<Result<TurnResult, SidekickCoreError>>,
}

impl TurnStream {
    /// Await completion of the turn.
    pub async fn finish(self) -> Result<TurnResult, SidekickCoreError> {
        self.handle
            .await
            .map_err(|err| SidekickCoreError::Executor(err.to_string()))?
    }
}

#[derive(Clone)]
struct TurnEventBus {
    sender: broadcast::Sender<EventMsg>,
}

impl TurnEventBus {
    fn new(buffer: usize) -> (Self, broadcast::Receiver<EventMsg>) {
        let (sender, receiver) = broadcast::channel(buffer);
        (Self { sender }, receiver)
    }
}

impl EventSink for TurnEventBus {
    fn emit(&self, event: EventMsg) {
        let _ = self.sender.send(event);
    }
}

struct FanoutEventSink {
    primary: Option<Arc<dyn EventSink>>,
    secondary: Arc<dyn EventSink>,
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: EventMsg) {
        if let Some(primary) = &self.primary {
            primary.emit(event.clone());
        }
        self.secondary.emit(event);
    }
}

/// Event emitter scoped to one turn.
struct TurnEvents {
    session_id: SessionId,
    turn_id: TurnId,
    sink: Option<Arc<dyn EventSink>>,
}

impl TurnEvents {
    fn emit(&self, payload: EventPayload) {
        if let Some(sink) = &self.sink {
            sink.emit(EventMsg::new(self.session_id, payload));
        }
    }
}

/// Runs chat turns against one provider with a shared tool registry.
#[derive(Clone)]
pub struct ChatEngine {
    config: Arc<SidekickConfig>,
    provider: Arc<dyn ChatProvider>,
    tools: ToolRegistry,
    sessions: SessionStore,
    planner: AttachmentPlanner,
    file_cache: Option<Arc<StagedFileCache>>,
    workspace_root: PathBuf,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl ChatEngine {
    pub fn new(
        config: SidekickConfig,
        provider: Arc<dyn ChatProvider>,
        tools: ToolRegistry,
        sessions: SessionStore,
    ) -> Self {
        let planner = AttachmentPlanner::new(config.attachments.clone());
        let workspace_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config: Arc::new(config),
            provider,
            tools,
            sessions,
            planner,
            file_cache: None,
            workspace_root,
            event_sink: None,
        }
    }

    /// Forward every turn event to `sink`.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Record staged uploads in `cache`.
    pub fn with_file_cache(mut self, cache: Arc<StagedFileCache>) -> Self {
        self.file_cache = Some(cache);
        self
    }

    /// Directory relative document paths resolve against.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn config(&self) -> &SidekickConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn ChatProvider> {
        &self.provider
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn to completion.
    ///
    /// Streams from the provider when both the config and the provider allow
    /// it; text deltas then reach the engine's event sink.
    pub async fn send(
        &self,
        session_id: SessionId,
        input: impl Into<String>,
        attachments: &[PathBuf],
    ) -> Result<TurnResult, SidekickCoreError> {
        let stream = self.config.chat.stream && self.provider.capabilities().streaming;
        let events = TurnEvents {
            session_id,
            turn_id: Uuid::new_v4(),
            sink: self.event_sink.clone(),
        };
        self.run_turn(&events, input.into(), attachments, stream)
            .await
    }

    /// Run one turn on a background task and stream its events.
    pub fn send_stream(
        &self,
        session_id: SessionId,
        input: impl Into<String>,
        attachments: Vec<PathBuf>,
    ) -> TurnStream {
        let turn_id = Uuid::new_v4();
        let (bus, receiver) = TurnEventBus::new(TURN_STREAM_BUFFER);
        let fanout: Arc<dyn EventSink> = Arc::new(FanoutEventSink {
            primary: self.event_sink.clone(),
            secondary: Arc::new(bus),
        });
        let engine = self.clone();
        let input = input.into();
        debug!(
            "streaming turn (session_id={}, turn_id={}, prompt_len={})",
            session_id,
            turn_id,
            input.len()
        );
        let handle = tokio::spawn(async move {
            let events = TurnEvents {
                session_id,
                turn_id,
                sink: Some(fanout),
            };
            engine.run_turn(&events, input, &attachments, true).await
        });

        TurnStream {
            session_id,
            turn_id,
            events: BroadcastStream::new(receiver),
            handle,
        }
    }

    async fn run_turn(
        &self,
        events: &TurnEvents,
        input: String,
        attachments: &[PathBuf],
        stream: bool,
    ) -> Result<TurnResult, SidekickCoreError> {
        info!(
            "turn started (session_id={}, turn_id={}, provider={}, attachments={})",
            events.session_id,
            events.turn_id,
            self.provider.id(),
            attachments.len()
        );
        events.emit(EventPayload::TurnStarted {
            turn_id: events.turn_id,
            provider: self.provider.id().to_string(),
            model: self.provider.model().to_string(),
        });

        match self.execute_turn(events, input, attachments, stream).await {
            Ok(result) => {
                events.emit(EventPayload::TurnCompleted {
                    turn_id: events.turn_id,
                    message: result.response.clone(),
                });
                Ok(result)
            }
            Err(err) => {
                warn!(
                    "turn failed (session_id={}, turn_id={}): {err}",
                    events.session_id, events.turn_id
                );
                events.emit(EventPayload::Error {
                    turn_id: Some(events.turn_id),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn execute_turn(
        &self,
        events: &TurnEvents,
        input: String,
        attachment_paths: &[PathBuf],
        stream: bool,
    ) -> Result<TurnResult, SidekickCoreError> {
        let session_id = events.session_id;
        let session = self.sessions.resume_session(session_id)?;
        let capabilities = self.provider.capabilities();

        // Reject every invalid file before anything is uploaded.
        let classified = attachment_paths
            .iter()
            .map(|path| self.planner.classify(path, self.provider.id(), &capabilities))
            .collect::<Result<Vec<_>, _>>()?;
        let mut attachment_refs = Vec::with_capacity(classified.len());
        let mut prepared = Vec::with_capacity(classified.len());
        for attachment in classified {
            let (attachment, payload) = self
                .planner
                .prepare(
                    self.provider.as_ref(),
                    attachment,
                    self.file_cache.as_deref(),
                )
                .await?;
            if let Some(remote_uri) = &attachment.remote_uri {
                events.emit(EventPayload::AttachmentStaged {
                    turn_id: events.turn_id,
                    display_name: attachment.display_name.clone(),
                    remote_uri: remote_uri.clone(),
                });
            }
            attachment_refs.push(attachment);
            prepared.push(payload);
        }

        let now = Utc::now();
        let mut messages =
            history_messages(&session.messages, self.provider.id(), &capabilities, now);
        let specs: Vec<ToolSpec> = if capabilities.tools {
            self.tools.specs()
        } else {
            Vec::new()
        };
        if let Some(system) = build_system_prompt(&self.config.chat, &specs, &messages, now) {
            messages.insert(0, ChatMessage::system(system));
        }
        messages.push(ChatMessage::user_with_attachments(input.clone(), prepared));
        self.sessions.append_message(
            session_id,
            Message::user(input).with_attachments(attachment_refs),
        )?;

        let request =
            ChatRequest::new(ensure_tool_results(messages.clone())).with_tools(declarations(&specs));
        let first = self.complete(&request, stream, events).await?;

        let (response, tool_outcome) = match first.tool_calls.split_first() {
            Some((call, skipped)) => {
                let (outcome, results) = self.run_tool_round(events, call, skipped).await;
                self.sessions.append_message(
                    session_id,
                    Message::tool_use(first.text.clone(), first.tool_calls.clone()),
                )?;
                for result in &results {
                    self.sessions
                        .append_message(session_id, Message::tool_result(result.clone()))?;
                }
                messages.push(ChatMessage::tool_use(
                    first.text.clone(),
                    first.tool_calls.clone(),
                ));
                messages.push(ChatMessage::tool_results(results));

                let followup = ChatRequest::new(ensure_tool_results(messages));
                let second = self.complete(&followup, stream, events).await?;
                if second.has_tool_calls() {
                    warn!(
                        "ignoring tool calls in final response (count={})",
                        second.tool_calls.len()
                    );
                }
                (second, Some(outcome))
            }
            None => (first, None),
        };

        let text = response.text;
        self.sessions
            .append_message(session_id, Message::assistant(text.clone()))?;

        let first_reply = !session
            .messages
            .iter()
            .any(|message| message.role == Role::Assistant && message.is_dialogue());
        let title = if session.title.is_empty() && first_reply {
            self.auto_title(session_id, &text).await
        } else {
            None
        };

        Ok(TurnResult {
            session_id,
            turn_id: events.turn_id,
            response: text,
            tool_outcome,
            title,
        })
    }

    async fn complete(
        &self,
        request: &ChatRequest,
        stream: bool,
        events: &TurnEvents,
    ) -> Result<ModelResponse, SidekickCoreError> {
        debug!(
            "model request (provider={}, messages={}, tools={}, stream={})",
            self.provider.id(),
            request.messages.len(),
            request.tools.len(),
            stream
        );
        let response = if stream {
            let chunks = self.provider.chat_stream(request).await?;
            collect_stream(chunks, |delta| {
                events.emit(EventPayload::AgentMessageDelta {
                    turn_id: events.turn_id,
                    delta: delta.to_string(),
                })
            })
            .await?
        } else {
            self.provider.chat(request).await?
        };
        if let Some(usage) = response.usage {
            debug!(
                "model usage (prompt_tokens={}, completion_tokens={})",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        Ok(response)
    }

    async fn run_tool_round(
        &self,
        events: &TurnEvents,
        call: &ToolCall,
        skipped: &[ToolCall],
    ) -> (ToolOutcome, Vec<ToolResult>) {
        let services = TurnServices {
            workspace_root: self.workspace_root.clone(),
            output_policy: Some(ToolOutputPolicy::from(&self.config.tools.output_policy)),
            event_sink: events.sink.clone(),
        };
        let executor = ToolExecutor::new(self.tools.clone(), Arc::new(services));
        info!(
            "running tool call (tool_name={}, call_id={}, skipped={})",
            call.name,
            call.id,
            skipped.len()
        );
        let outcome = executor
            .execute_call(
                events.session_id,
                Some(events.turn_id),
                None,
                &call.name,
                &call.arguments,
            )
            .await;

        let mut results = vec![ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: outcome.to_content(),
            is_error: !outcome.success,
        }];
        for extra in skipped {
            let rejected = ToolOutcome {
                success: false,
                tool_name: extra.name.clone(),
                result: None,
                error: Some(SKIPPED_CALL_ERROR.to_string()),
            };
            results.push(ToolResult {
                call_id: extra.id.clone(),
                name: extra.name.clone(),
                content: rejected.to_content(),
                is_error: true,
            });
        }
        (outcome, results)
    }

    async fn auto_title(&self, session_id: SessionId, reply: &str) -> Option<String> {
        let max_chars = self.config.chat.title_max_chars;
        let generated = match self.provider.chat(&title_request(reply)).await {
            Ok(response) => parse_title_reply(&response.text, max_chars),
            Err(err) => {
                debug!("title request failed, using local title: {err}");
                None
            }
        };
        let title = generated.or_else(|| suggest_title(reply, max_chars))?;
        if let Err(err) = self.sessions.rename_session(session_id, &title) {
            warn!("cannot store session title (session_id={session_id}): {err}");
            return None;
        }
        Some(title)
    }
}

fn declarations(specs: &[ToolSpec]) -> Vec<ToolDeclaration> {
    specs
        .iter()
        .map(|spec| ToolDeclaration {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.args_schema.clone(),
        })
        .collect()
}

/// Rebuild provider messages from a stored transcript.
///
/// Attachments whose bytes cannot be sent again, or that `provider_id`
/// cannot reference, are replaced by a note in the message text.
pub fn history_messages(
    messages: &[Message],
    provider_id: &str,
    capabilities: &ProviderCapabilities,
    now: DateTime<Utc>,
) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|message| history_message(message, provider_id, capabilities, now))
        .collect()
}

fn history_message(
    message: &Message,
    provider_id: &str,
    capabilities: &ProviderCapabilities,
    now: DateTime<Utc>,
) -> ChatMessage {
    if let Some(result) = &message.tool_result {
        return ChatMessage::tool_results(vec![result.clone()]);
    }
    if !message.tool_calls.is_empty() {
        return ChatMessage::tool_use(message.content.clone(), message.tool_calls.clone());
    }
    if message.attachments.is_empty() {
        return ChatMessage::text(message.role, message.content.clone());
    }

    let mut content = message.content.clone();
    let mut prepared = Vec::new();
    for attachment in &message.attachments {
        match history_attachment(attachment, provider_id, capabilities, now) {
            Some(payload) => prepared.push(payload),
            None => content.push_str(&format!(
                "\n[attachment {} ({}) is no longer available]",
                attachment.display_name, attachment.mime_type
            )),
        }
    }
    ChatMessage::user_with_attachments(content, prepared)
}

#[cfg(test)]
mod tests {
    use super::history_messages;
    use crate::types::Message;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sidekick_rs_llm::{
        AttachmentPayload, MessageType, ProviderCapabilities, ToolCall, ToolResult,
    };
    use sidekick_rs_protocol::{AttachmentKind, AttachmentRef, UploadStrategy};

    fn staging_caps() -> ProviderCapabilities {
        ProviderCapabilities {
            staged_kinds: vec![AttachmentKind::Video],
            always_staged_kinds: vec![AttachmentKind::Video],
            ..ProviderCapabilities::text_only()
        }
    }

    fn attachment(strategy: UploadStrategy, hours_left: i64) -> AttachmentRef {
        let now = Utc::now();
        AttachmentRef {
            path: "/tmp/clip.mp4".to_string(),
            display_name: "clip.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            kind: AttachmentKind::Video,
            size_bytes: 10,
            strategy,
            remote_uri: Some("https://files/clip".to_string()),
            remote_name: Some("files/clip".to_string()),
            expires_at: Some(now + Duration::hours(hours_left)),
            provider: Some("gemini".to_string()),
        }
    }

    #[test]
    fn history_keeps_live_remote_attachments() {
        let message =
            Message::user("what is this").with_attachments(vec![attachment(UploadStrategy::RemoteStaged, 5)]);
        let history = history_messages(&[message], "gemini", &staging_caps(), Utc::now());
        match &history[0].message_type {
            MessageType::Attachments(items) => assert_eq!(
                items[0].payload,
                AttachmentPayload::Remote {
                    uri: "https://files/clip".to_string()
                }
            ),
            other => panic!("unexpected message type: {other:?}"),
        }
    }

    #[test]
    fn history_notes_expired_and_inline_attachments() {
        let message = Message::user("look").with_attachments(vec![
            attachment(UploadStrategy::RemoteStaged, -1),
            attachment(UploadStrategy::Inline, 5),
        ]);
        let history = history_messages(&[message], "gemini", &staging_caps(), Utc::now());
        assert_eq!(history[0].message_type, MessageType::Text);
        assert_eq!(history[0].content.matches("no longer available").count(), 2);
    }

    #[test]
    fn history_notes_attachments_the_provider_cannot_reference() {
        let message = Message::user("what is this")
            .with_attachments(vec![attachment(UploadStrategy::RemoteStaged, 5)]);
        let history = history_messages(
            &[message],
            "deepseek",
            &ProviderCapabilities::text_only(),
            Utc::now(),
        );
        assert_eq!(history[0].message_type, MessageType::Text);
        assert_eq!(
            history[0].content,
            "what is this\n[attachment clip.mp4 (video/mp4) is no longer available]"
        );
    }

    #[test]
    fn history_restores_tool_exchange() {
        let call = ToolCall {
            id: "call_0".to_string(),
            name: "get_system_time".to_string(),
            arguments: json!({}),
        };
        let result = ToolResult {
            call_id: "call_0".to_string(),
            name: "get_system_time".to_string(),
            content: "{\"success\":true}".to_string(),
            is_error: false,
        };
        let history = history_messages(
            &[
                Message::tool_use("", vec![call.clone()]),
                Message::tool_result(result.clone()),
            ],
            "gemini",
            &staging_caps(),
            Utc::now(),
        );
        assert_eq!(history[0].tool_calls(), &[call]);
        assert_eq!(history[1].message_type, MessageType::ToolResult(vec![result]));
    }
}
