//! OpenAI chat-completions compatible adapter (DeepSeek and similar).

use crate::error::ProviderError;
use crate::http::{check_status, error_message, read_json, sse_chunks};
use crate::provider::{ChatProvider, ChunkStream};
use crate::types::{
    AttachmentPayload, ChatMessage, ChatRequest, MessageType, ModelResponse, PreparedAttachment,
    ProviderCapabilities, StreamChunk, TokenUsage, ToolCall, ToolCallDelta,
};
use async_trait::async_trait;
use log::{debug, info};
use serde_json::{Map, Value, json};
use sidekick_rs_config::ResolvedProvider;
use sidekick_rs_protocol::{AttachmentKind, Role};

/// Adapter for `POST {api_url}/chat/completions` endpoints.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    id: String,
    model: String,
    api_url: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
    capabilities: ProviderCapabilities,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        client: reqwest::Client,
        settings: &ResolvedProvider,
        api_key: String,
        capabilities: ProviderCapabilities,
    ) -> Self {
        Self {
            client,
            id: settings.id.clone(),
            model: settings.model.clone(),
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            capabilities,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_url)
    }

    /// Build the JSON request body.
    pub fn encode_request(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<Value, ProviderError> {
        let mut messages = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            encode_message(message, &mut messages)?;
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_output_tokens.unwrap_or(self.max_output_tokens),
            "stream": stream,
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = json!("auto");
        }
        if stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        Ok(body)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }
}

fn encode_message(message: &ChatMessage, out: &mut Vec<Value>) -> Result<(), ProviderError> {
    match &message.message_type {
        MessageType::Text => out.push(json!({
            "role": wire_role(message.role),
            "content": message.content,
        })),
        MessageType::Attachments(attachments) => {
            let mut parts = Vec::with_capacity(attachments.len() + 1);
            if !message.content.is_empty() {
                parts.push(json!({ "type": "text", "text": message.content }));
            }
            for attachment in attachments {
                parts.push(encode_attachment(attachment)?);
            }
            out.push(json!({ "role": wire_role(message.role), "content": parts }));
        }
        MessageType::ToolUse(calls) => {
            let tool_calls: Vec<Value> = calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": arguments_text(&call.arguments),
                        }
                    })
                })
                .collect();
            let content = if message.content.is_empty() {
                Value::Null
            } else {
                Value::String(message.content.clone())
            };
            out.push(json!({
                "role": "assistant",
                "content": content,
                "tool_calls": tool_calls,
            }));
        }
        MessageType::ToolResult(results) => {
            for result in results {
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": result.call_id,
                    "content": result.content,
                }));
            }
        }
    }
    Ok(())
}

fn wire_role(role: Role) -> &'static str {
    match role {
        // Bare tool text has no call id to answer, so it is sent as user context.
        Role::Tool => "user",
        other => other.as_str(),
    }
}

fn encode_attachment(attachment: &PreparedAttachment) -> Result<Value, ProviderError> {
    match (&attachment.kind, &attachment.payload) {
        (AttachmentKind::Image, AttachmentPayload::Inline { data }) => Ok(json!({
            "type": "image_url",
            "image_url": { "url": format!("data:{};base64,{}", attachment.mime_type, data) }
        })),
        (kind, AttachmentPayload::Inline { .. }) => Err(ProviderError::Unsupported(format!(
            "{} attachments are not accepted by chat completions ({})",
            kind.as_str(),
            attachment.display_name
        ))),
        (_, AttachmentPayload::Remote { .. }) => Err(ProviderError::Unsupported(format!(
            "remote file references are not accepted by chat completions ({})",
            attachment.display_name
        ))),
    }
}

fn arguments_text(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

/// Decode a non-streaming completion body.
pub fn decode_response(body: &Value) -> Result<ModelResponse, ProviderError> {
    if let Some(message) = error_message(body) {
        return Err(ProviderError::Decode(message));
    }
    let choice = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| ProviderError::Decode("response has no choices".to_string()))?;
    let message = choice
        .get("message")
        .ok_or_else(|| ProviderError::Decode("choice has no message".to_string()))?;

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .filter_map(|(index, call)| decode_tool_call(index, call))
                .collect()
        })
        .unwrap_or_default();

    Ok(ModelResponse {
        text,
        tool_calls,
        finish_reason: choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(str::to_string),
        usage: body.get("usage").and_then(decode_usage),
    })
}

fn decode_tool_call(index: usize, call: &Value) -> Option<ToolCall> {
    let function = call.get("function")?;
    let name = function.get("name").and_then(Value::as_str)?.to_string();
    let raw = function
        .get("arguments")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let arguments = if raw.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    };
    let id = call
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{index}"));
    Some(ToolCall {
        id,
        name,
        arguments,
    })
}

fn decode_usage(usage: &Value) -> Option<TokenUsage> {
    if usage.is_null() {
        return None;
    }
    let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or_default();
    Some(TokenUsage {
        prompt_tokens: field("prompt_tokens"),
        completion_tokens: field("completion_tokens"),
        total_tokens: field("total_tokens"),
    })
}

/// Decode one `data:` payload of a streaming completion.
pub fn decode_chunk(data: &str) -> Result<Option<StreamChunk>, ProviderError> {
    let event: Value = serde_json::from_str(data)
        .map_err(|err| ProviderError::Decode(format!("invalid sse payload: {err}")))?;
    if let Some(message) = error_message(&event) {
        return Err(ProviderError::Decode(format!("stream error: {message}")));
    }

    let usage = event.get("usage").and_then(decode_usage);
    let choice = event
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first());
    let Some(choice) = choice else {
        return Ok(usage.map(|usage| StreamChunk {
            usage: Some(usage),
            ..StreamChunk::default()
        }));
    };

    let delta = choice.get("delta").cloned().unwrap_or(Value::Null);
    let tool_calls = delta
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .map(|(position, call)| {
                    let function = call.get("function");
                    ToolCallDelta {
                        index: call
                            .get("index")
                            .and_then(Value::as_u64)
                            .map(|index| index as usize)
                            .unwrap_or(position),
                        id: call.get("id").and_then(Value::as_str).map(str::to_string),
                        name: function
                            .and_then(|function| function.get("name"))
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        arguments: function
                            .and_then(|function| function.get("arguments"))
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Some(StreamChunk {
        text: delta
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string),
        tool_calls,
        finish_reason: choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(str::to_string),
        usage,
    }))
}

#[async_trait]
impl ChatProvider for OpenAiCompatibleProvider {
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
        let body = self.encode_request(request, false)?;
        info!(
            "chat completion request (provider={}, model={}, messages={}, tools={})",
            self.id,
            self.model,
            request.messages.len(),
            request.tools.len()
        );
        let response = self.post(&body).await?;
        let value = read_json(response).await?;
        let decoded = decode_response(&value)?;
        debug!(
            "chat completion response (provider={}, tool_calls={}, finish={:?})",
            self.id,
            decoded.tool_calls.len(),
            decoded.finish_reason
        );
        Ok(decoded)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ProviderError> {
        let body = self.encode_request(request, true)?;
        info!(
            "chat completion stream (provider={}, model={}, messages={}, tools={})",
            self.id,
            self.model,
            request.messages.len(),
            request.tools.len()
        );
        let response = self.post(&body).await?;
        Ok(sse_chunks(response, decode_chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::{OpenAiCompatibleProvider, decode_chunk, decode_response};
    use crate::error::ProviderError;
    use crate::types::{
        AttachmentPayload, ChatMessage, ChatRequest, PreparedAttachment, ProviderCapabilities,
        ToolCall, ToolDeclaration, ToolResult,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sidekick_rs_config::ProvidersConfig;
    use sidekick_rs_protocol::AttachmentKind;

    fn provider() -> OpenAiCompatibleProvider {
        let settings = ProvidersConfig::default()
            .resolve("deepseek")
            .expect("deepseek");
        OpenAiCompatibleProvider::new(
            reqwest::Client::new(),
            &settings,
            "sk-test".to_string(),
            ProviderCapabilities::text_only(),
        )
    }

    #[test]
    fn encodes_tool_exchange_in_chat_completions_shape() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "baidu_search".to_string(),
            arguments: json!({ "query": "weather" }),
        };
        let request = ChatRequest::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("weather?"),
            ChatMessage::tool_use("", vec![call]),
            ChatMessage::tool_results(vec![ToolResult {
                call_id: "call_1".to_string(),
                name: "baidu_search".to_string(),
                content: "{\"success\":true}".to_string(),
                is_error: false,
            }]),
        ])
        .with_tools(vec![ToolDeclaration {
            name: "baidu_search".to_string(),
            description: "search".to_string(),
            parameters: json!({ "type": "object" }),
        }]);

        let body = provider().encode_request(&request, false).expect("encode");
        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "baidu_search");
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2]["content"], json!(null));
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            "{\"query\":\"weather\"}"
        );
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn omits_tools_when_none_declared() {
        let body = provider()
            .encode_request(&ChatRequest::new(vec![ChatMessage::user("hi")]), true)
            .expect("encode");
        assert!(body.get("tools").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn inline_images_become_data_urls_and_pdfs_are_rejected() {
        let image = PreparedAttachment {
            display_name: "cat.png".to_string(),
            mime_type: "image/png".to_string(),
            kind: AttachmentKind::Image,
            payload: AttachmentPayload::Inline {
                data: "AAAA".to_string(),
            },
        };
        let request = ChatRequest::new(vec![ChatMessage::user_with_attachments(
            "what is this",
            vec![image.clone()],
        )]);
        let body = provider().encode_request(&request, false).expect("encode");
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );

        let pdf = PreparedAttachment {
            kind: AttachmentKind::Pdf,
            mime_type: "application/pdf".to_string(),
            display_name: "a.pdf".to_string(),
            ..image
        };
        let request =
            ChatRequest::new(vec![ChatMessage::user_with_attachments("read", vec![pdf])]);
        let err = provider()
            .encode_request(&request, false)
            .expect_err("pdf rejected");
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }

    #[test]
    fn decodes_tool_calls_and_usage() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": { "name": "get_system_time", "arguments": "{\"timezone\":\"UTC\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        });
        let response = decode_response(&body).expect("decode");
        assert_eq!(response.text, "");
        assert_eq!(response.tool_calls[0].id, "call_9");
        assert_eq!(response.tool_calls[0].arguments, json!({ "timezone": "UTC" }));
        assert_eq!(response.usage.map(|usage| usage.total_tokens), Some(15));
    }

    #[test]
    fn decodes_stream_deltas_and_errors() {
        let chunk = decode_chunk(
            r#"{"object":"chat.completion.chunk","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"baidu_search","arguments":"{\"q"}}]},"finish_reason":null}]}"#,
        )
        .expect("decode")
        .expect("chunk");
        assert_eq!(chunk.tool_calls[0].name.as_deref(), Some("baidu_search"));
        assert_eq!(chunk.tool_calls[0].arguments.as_deref(), Some("{\"q"));

        let usage_only = decode_chunk(r#"{"choices":[],"usage":{"total_tokens":3}}"#)
            .expect("decode")
            .expect("usage chunk");
        assert_eq!(usage_only.usage.map(|usage| usage.total_tokens), Some(3));
        assert_eq!(decode_chunk(r#"{"choices":[]}"#).expect("decode"), None);

        let err = decode_chunk(r#"{"error":{"message":"rate limited"}}"#).expect_err("error");
        assert!(err.to_string().contains("rate limited"));
    }
}
