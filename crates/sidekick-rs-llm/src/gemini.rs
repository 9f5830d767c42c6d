//! Google Gemini `generateContent` adapter and File API client.

use crate::error::ProviderError;
use crate::http::{check_status, error_message, read_json, sse_chunks};
use crate::provider::{ChatProvider, ChunkStream};
use crate::types::{
    AttachmentPayload, ChatMessage, ChatRequest, FileState, MessageType, ModelResponse,
    PreparedAttachment, ProviderCapabilities, StagedFile, StreamChunk, TokenUsage, ToolCall,
    ToolCallDelta, ToolDeclaration, ToolResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::{Map, Value, json};
use sidekick_rs_config::ResolvedProvider;
use sidekick_rs_protocol::Role;
use std::path::Path;

/// Schema keywords the Gemini function declaration format rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["default", "additionalProperties", "$schema"];

/// Adapter for the Gemini REST API.
pub struct GeminiProvider {
    client: reqwest::Client,
    id: String,
    model: String,
    api_url: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
    capabilities: ProviderCapabilities,
}

impl GeminiProvider {
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

    fn model_url(&self, method: &str) -> String {
        format!("{}/models/{}:{method}", self.api_url, self.model)
    }

    /// Resumable upload endpoint, e.g. `https://host/upload/v1beta/files`.
    fn upload_url(&self) -> String {
        match self.api_url.rsplit_once('/') {
            Some((host, version)) if version.starts_with('v') => {
                format!("{host}/upload/{version}/files")
            }
            _ => format!("{}/upload/files", self.api_url),
        }
    }

    fn file_url(&self, name: &str) -> String {
        format!("{}/{}", self.api_url, name.trim_start_matches('/'))
    }

    /// Build the JSON request body.
    pub fn encode_request(&self, request: &ChatRequest) -> Result<Value, ProviderError> {
        let mut system = Vec::new();
        let mut contents = Vec::new();
        for message in &request.messages {
            if message.role == Role::System {
                if !message.content.is_empty() {
                    system.push(json!({ "text": message.content }));
                }
                continue;
            }
            if let Some(content) = encode_message(message)? {
                contents.push(content);
            }
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": request.temperature.unwrap_or(self.temperature),
                "maxOutputTokens": request.max_output_tokens.unwrap_or(self.max_output_tokens),
            },
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": system });
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request.tools.iter().map(encode_declaration).collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }
        Ok(body)
    }

    async fn post_model(
        &self,
        method: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.model_url(method))
            .query(&[("key", self.api_key.as_str())])
            .query(query)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }
}

fn encode_message(message: &ChatMessage) -> Result<Option<Value>, ProviderError> {
    let role = match message.role {
        Role::Assistant => "model",
        _ => "user",
    };
    let mut parts = Vec::new();
    if !message.content.is_empty() {
        parts.push(json!({ "text": message.content }));
    }
    match &message.message_type {
        MessageType::Text => {}
        MessageType::Attachments(attachments) => {
            for attachment in attachments {
                parts.push(encode_attachment(attachment));
            }
        }
        MessageType::ToolUse(calls) => {
            for call in calls {
                parts.push(json!({
                    "functionCall": { "name": call.name, "args": call_args(&call.arguments) }
                }));
            }
        }
        MessageType::ToolResult(results) => {
            // Function responses are sent on the user turn.
            for result in results {
                parts.push(encode_function_response(result));
            }
            return Ok(Some(json!({ "role": "user", "parts": parts })));
        }
    }
    if parts.is_empty() {
        return Ok(None);
    }
    Ok(Some(json!({ "role": role, "parts": parts })))
}

fn encode_attachment(attachment: &PreparedAttachment) -> Value {
    match &attachment.payload {
        AttachmentPayload::Inline { data } => json!({
            "inlineData": { "mimeType": attachment.mime_type, "data": data }
        }),
        AttachmentPayload::Remote { uri } => json!({
            "fileData": { "mimeType": attachment.mime_type, "fileUri": uri }
        }),
    }
}

fn call_args(arguments: &Value) -> Value {
    match arguments {
        Value::Object(_) => arguments.clone(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => json!({ "raw": raw }),
        },
        Value::Null => Value::Object(Map::new()),
        other => json!({ "value": other }),
    }
}

fn encode_function_response(result: &ToolResult) -> Value {
    let content =
        serde_json::from_str(&result.content).unwrap_or_else(|_| json!(result.content));
    let response = if result.is_error {
        json!({ "error": content })
    } else {
        json!({ "content": content })
    };
    json!({ "functionResponse": { "name": result.name, "response": response } })
}

fn encode_declaration(tool: &ToolDeclaration) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": sanitize_schema(&tool.parameters),
    })
}

/// Strip schema keywords Gemini does not accept.
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), sanitize_schema(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

/// Parts of the first candidate, decoded.
struct DecodedCandidate {
    text: String,
    calls: Vec<(Option<String>, String, Value)>,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
}

fn decode_candidate(body: &Value) -> Result<DecodedCandidate, ProviderError> {
    if let Some(message) = error_message(body) {
        return Err(ProviderError::Decode(message));
    }
    let candidate = body
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first());
    let usage = body.get("usageMetadata").map(decode_usage);

    let Some(candidate) = candidate else {
        if let Some(reason) = body
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            return Err(ProviderError::Decode(format!("prompt blocked: {reason}")));
        }
        return Ok(DecodedCandidate {
            text: String::new(),
            calls: Vec::new(),
            finish_reason: None,
            usage,
        });
    };

    let mut text = String::new();
    let mut calls = Vec::new();
    let parts = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array);
    for part in parts.into_iter().flatten() {
        if part.get("thought").and_then(Value::as_bool) == Some(true) {
            continue;
        }
        if let Some(chunk) = part.get("text").and_then(Value::as_str) {
            text.push_str(chunk);
        }
        if let Some(call) = part.get("functionCall") {
            let Some(name) = call.get("name").and_then(Value::as_str) else {
                continue;
            };
            let id = call.get("id").and_then(Value::as_str).map(str::to_string);
            let args = call
                .get("args")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));
            calls.push((id, name.to_string(), args));
        }
    }

    Ok(DecodedCandidate {
        text,
        calls,
        finish_reason: candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .map(str::to_string),
        usage,
    })
}

fn decode_usage(usage: &Value) -> TokenUsage {
    let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or_default();
    TokenUsage {
        prompt_tokens: field("promptTokenCount"),
        completion_tokens: field("candidatesTokenCount"),
        total_tokens: field("totalTokenCount"),
    }
}

/// Decode a `generateContent` response body.
pub fn decode_response(body: &Value) -> Result<ModelResponse, ProviderError> {
    let decoded = decode_candidate(body)?;
    let tool_calls = decoded
        .calls
        .into_iter()
        .enumerate()
        .map(|(index, (id, name, arguments))| ToolCall {
            id: id.unwrap_or_else(|| format!("call_{index}")),
            name,
            arguments,
        })
        .collect();
    Ok(ModelResponse {
        text: decoded.text,
        tool_calls,
        finish_reason: decoded.finish_reason,
        usage: decoded.usage,
    })
}

/// Decode one streamed `GenerateContentResponse`.
///
/// Gemini sends each function call whole, so calls are numbered from
/// `next_index` across the stream.
pub fn decode_chunk(
    data: &str,
    next_index: &mut usize,
) -> Result<Option<StreamChunk>, ProviderError> {
    let event: Value = serde_json::from_str(data)
        .map_err(|err| ProviderError::Decode(format!("invalid sse payload: {err}")))?;
    let decoded = decode_candidate(&event)?;
    let tool_calls = decoded
        .calls
        .into_iter()
        .map(|(id, name, arguments)| {
            let index = *next_index;
            *next_index += 1;
            ToolCallDelta {
                index,
                id,
                name: Some(name),
                arguments: Some(arguments.to_string()),
            }
        })
        .collect();
    Ok(Some(StreamChunk {
        text: (!decoded.text.is_empty()).then_some(decoded.text),
        tool_calls,
        finish_reason: decoded.finish_reason,
        usage: decoded.usage,
    }))
}

/// Parse a File API `File` resource.
pub fn decode_file(file: &Value) -> Result<StagedFile, ProviderError> {
    let field = |name: &str| file.get(name).and_then(Value::as_str);
    let name = field("name")
        .ok_or_else(|| ProviderError::Staging("file resource has no name".to_string()))?;
    let expires_at = field("expirationTime")
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc));
    Ok(StagedFile {
        name: name.to_string(),
        uri: field("uri").unwrap_or_default().to_string(),
        mime_type: field("mimeType").unwrap_or_default().to_string(),
        // Uploads without a reported state are usable immediately.
        state: field("state").map(FileState::parse).unwrap_or(FileState::Active),
        expires_at,
    })
}

#[async_trait]
impl ChatProvider for GeminiProvider {
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
        let body = self.encode_request(request)?;
        info!(
            "gemini request (model={}, contents={}, tools={})",
            self.model,
            body["contents"].as_array().map(Vec::len).unwrap_or_default(),
            request.tools.len()
        );
        let response = self.post_model("generateContent", &[], &body).await?;
        let value = read_json(response).await?;
        let decoded = decode_response(&value)?;
        debug!(
            "gemini response (tool_calls={}, finish={:?})",
            decoded.tool_calls.len(),
            decoded.finish_reason
        );
        Ok(decoded)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ProviderError> {
        let body = self.encode_request(request)?;
        info!(
            "gemini stream (model={}, tools={})",
            self.model,
            request.tools.len()
        );
        let response = self
            .post_model("streamGenerateContent", &[("alt", "sse")], &body)
            .await?;
        let mut next_index = 0usize;
        Ok(sse_chunks(response, move |data| {
            decode_chunk(data, &mut next_index)
        }))
    }

    async fn stage_file(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> Result<StagedFile, ProviderError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|err| ProviderError::Staging(format!("open {}: {err}", path.display())))?;
        let size = file
            .metadata()
            .await
            .map_err(|err| ProviderError::Staging(format!("stat {}: {err}", path.display())))?
            .len();
        info!(
            "file upload start (name={}, mime={}, bytes={})",
            display_name, mime_type, size
        );

        let start = self
            .client
            .post(self.upload_url())
            .query(&[("key", self.api_key.as_str())])
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = check_status(start).await?;
        let session_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::Staging("upload start response has no x-goog-upload-url".to_string())
            })?;

        let finish = self
            .client
            .post(session_url)
            .header(reqwest::header::CONTENT_LENGTH, size.to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(reqwest::Body::from(file))
            .send()
            .await?;
        let value = read_json(finish).await?;
        let staged = decode_file(value.get("file").unwrap_or(&value))?;
        info!(
            "file upload finished (name={}, state={:?})",
            staged.name, staged.state
        );
        Ok(staged)
    }

    async fn file_status(&self, name: &str) -> Result<StagedFile, ProviderError> {
        let response = self
            .client
            .get(self.file_url(name))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;
        let value = read_json(response).await?;
        decode_file(&value)
    }

    async fn delete_staged_file(&self, name: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(self.file_url(name))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;
        check_status(response).await?;
        info!("staged file deleted (name={name})");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{GeminiProvider, decode_chunk, decode_file, decode_response, sanitize_schema};
    use crate::types::{
        AttachmentPayload, ChatMessage, ChatRequest, FileState, PreparedAttachment,
        ProviderCapabilities, ToolCall, ToolDeclaration, ToolResult,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sidekick_rs_config::ProvidersConfig;
    use sidekick_rs_protocol::AttachmentKind;

    fn provider() -> GeminiProvider {
        let settings = ProvidersConfig::default().resolve("gemini").expect("gemini");
        GeminiProvider::new(
            reqwest::Client::new(),
            &settings,
            "g-key".to_string(),
            ProviderCapabilities::text_only(),
        )
    }

    #[test]
    fn upload_url_inserts_upload_segment() {
        assert_eq!(
            provider().upload_url(),
            "https://generativelanguage.googleapis.com/upload/v1beta/files"
        );
    }

    #[test]
    fn encodes_system_attachments_and_function_exchange() {
        let request = ChatRequest::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user_with_attachments(
                "describe",
                vec![PreparedAttachment {
                    display_name: "clip.mp4".to_string(),
                    mime_type: "video/mp4".to_string(),
                    kind: AttachmentKind::Video,
                    payload: AttachmentPayload::Remote {
                        uri: "https://files/abc".to_string(),
                    },
                }],
            ),
            ChatMessage::tool_use(
                "",
                vec![ToolCall {
                    id: "call_0".to_string(),
                    name: "google_search".to_string(),
                    arguments: json!("{\"query\":\"x\"}"),
                }],
            ),
            ChatMessage::tool_results(vec![ToolResult {
                call_id: "call_0".to_string(),
                name: "google_search".to_string(),
                content: "{\"success\":false,\"error\":\"timed out\"}".to_string(),
                is_error: true,
            }]),
        ])
        .with_tools(vec![ToolDeclaration {
            name: "google_search".to_string(),
            description: "search".to_string(),
            parameters: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": { "num": { "type": "integer", "default": 5 } }
            }),
        }]);

        let body = provider().encode_request(&request).expect("encode");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        let contents = body["contents"].as_array().expect("contents");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["parts"][1]["fileData"]["fileUri"], "https://files/abc");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["args"], json!({ "query": "x" }));
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["error"]["error"],
            "timed out"
        );
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["parameters"],
            json!({ "type": "object", "properties": { "num": { "type": "integer" } } })
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn sanitize_leaves_supported_keywords() {
        let schema = json!({ "type": "string", "enum": ["a"], "$schema": "x" });
        assert_eq!(sanitize_schema(&schema), json!({ "type": "string", "enum": ["a"] }));
    }

    #[test]
    fn decodes_text_and_function_calls() {
        let body = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "checking" },
                        { "functionCall": { "name": "baidu_search", "args": { "query": "news" } } }
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 7, "candidatesTokenCount": 3, "totalTokenCount": 10 }
        });
        let response = decode_response(&body).expect("decode");
        assert_eq!(response.text, "checking");
        assert_eq!(response.tool_calls[0].id, "call_0");
        assert_eq!(response.tool_calls[0].arguments, json!({ "query": "news" }));
        assert_eq!(response.usage.map(|usage| usage.total_tokens), Some(10));
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let body = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = decode_response(&body).expect_err("blocked");
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn stream_chunks_number_calls_across_events() {
        let mut next = 0;
        let event = r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"a","args":{}}}]}}]}"#;
        let first = decode_chunk(event, &mut next).expect("decode").expect("chunk");
        let second = decode_chunk(event, &mut next).expect("decode").expect("chunk");
        assert_eq!(first.tool_calls[0].index, 0);
        assert_eq!(second.tool_calls[0].index, 1);
        assert_eq!(first.tool_calls[0].arguments.as_deref(), Some("{}"));
    }

    #[test]
    fn decodes_file_resource() {
        let file = decode_file(&json!({
            "name": "files/abc",
            "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc",
            "mimeType": "video/mp4",
            "state": "PROCESSING",
            "expirationTime": "2025-01-03T10:00:00.123Z"
        }))
        .expect("file");
        assert_eq!(file.state, FileState::Processing);
        assert_eq!(
            file.expires_at.map(|at| at.timestamp()),
            Some(1_735_898_400)
        );
    }
}
