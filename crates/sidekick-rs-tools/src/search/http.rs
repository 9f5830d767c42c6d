//! Mapping of HTTP failures into tool errors.

use reqwest::{Response, StatusCode};
use sidekick_rs_protocol::ToolError;

/// Longest upstream error body echoed into a tool error.
const MAX_ERROR_BODY: usize = 300;

/// Map a transport error into the matching tool error class.
pub(crate) fn map_send_error(engine: &str, err: reqwest::Error) -> ToolError {
    if err.is_timeout() {
        ToolError::Timeout(format!("{engine} search request timed out"))
    } else {
        ToolError::ExecutionFailed(format!("{engine} search request failed: {err}"))
    }
}

/// Turn a non-success response into a tool error, passing success through.
pub(crate) async fn check_status(engine: &str, response: Response) -> Result<Response, ToolError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body = clip(body.trim());
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ToolError::Unauthorized(format!("{engine} search rejected credentials ({status}): {body}"))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ToolError::Timeout(format!("{engine} search timed out upstream ({status})"))
        }
        _ => ToolError::ExecutionFailed(format!("{engine} search returned {status}: {body}")),
    })
}

fn clip(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let end = body
        .char_indices()
        .map(|(idx, ch)| idx + ch.len_utf8())
        .take_while(|next| *next <= MAX_ERROR_BODY)
        .last()
        .unwrap_or(0);
    format!("{}...", &body[..end])
}
