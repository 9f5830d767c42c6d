//! `read_document`: text extraction from local PDF and text files.

use crate::builtins::utils::parse_args;
use crate::{Tool, ToolContext};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};
use sidekick_rs_protocol::ToolError;
use std::path::Path;

/// Largest file the tool will read.
const MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;
/// Page separator emitted by the PDF text extractor.
const PAGE_BREAK: char = '\u{c}';

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "heic", "heif"];

/// Tool that reads documents the user has referenced.
#[derive(Debug, Default)]
pub struct ReadDocumentTool;

#[derive(Debug, Deserialize)]
struct ReadDocumentArgs {
    file_id: String,
    #[serde(default)]
    pages: Option<Vec<usize>>,
}

#[async_trait]
impl Tool for ReadDocumentTool {
    fn name(&self) -> &str {
        "read_document"
    }

    fn description(&self) -> &str {
        "Read the text of a local PDF or plain-text document the user referenced."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_id": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Path of the document to read."
                },
                "pages": {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 1 },
                    "description": "1-based PDF pages to read. Omit to read every page."
                }
            },
            "required": ["file_id"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let input: ReadDocumentArgs = parse_args(args)?;
        let path = ctx.resolve_path(&input.file_id);
        let extension = extension_of(&path);
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ToolError::InvalidArguments(format!(
                "{} is an image; text recognition is not available, attach it to the message instead",
                input.file_id
            )));
        }
        let metadata = tokio::fs::metadata(&path).await.map_err(|err| {
            ToolError::ExecutionFailed(format!("cannot open {}: {err}", path.display()))
        })?;
        if !metadata.is_file() {
            return Err(ToolError::InvalidArguments(format!(
                "{} is not a file",
                input.file_id
            )));
        }
        if metadata.len() > MAX_DOCUMENT_BYTES {
            return Err(ToolError::InvalidArguments(format!(
                "{} is {} bytes; the limit is {MAX_DOCUMENT_BYTES}",
                input.file_id,
                metadata.len()
            )));
        }
        let bytes = tokio::fs::read(&path).await.map_err(|err| {
            ToolError::ExecutionFailed(format!("cannot read {}: {err}", path.display()))
        })?;
        debug!(
            "reading document (extension={}, bytes={})",
            extension,
            bytes.len()
        );
        if extension == "pdf" {
            let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                .await
                .map_err(|err| ToolError::ExecutionFailed(format!("pdf worker failed: {err}")))?
                .map_err(|err| ToolError::ExecutionFailed(format!("pdf text extraction failed: {err}")))?;
            Ok(select_pages(&text, input.pages.as_deref()))
        } else {
            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
            };
            Ok(json!({
                "file_type": "text",
                "content": text,
                "characters": text.chars().count(),
            }))
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Split extracted PDF text into pages and keep the requested ones.
fn select_pages(text: &str, wanted: Option<&[usize]>) -> Value {
    let mut pages: Vec<&str> = text.split(PAGE_BREAK).map(str::trim).collect();
    if pages.len() > 1 && pages.last().is_some_and(|last| last.is_empty()) {
        pages.pop();
    }
    let total_pages = pages.len();
    let selected: Vec<usize> = match wanted {
        Some(numbers) if !numbers.is_empty() => numbers
            .iter()
            .copied()
            .filter(|page| (1..=total_pages).contains(page))
            .collect(),
        _ => (1..=total_pages).collect(),
    };
    let content: Vec<Value> = selected
        .iter()
        .map(|page| json!({ "page": page, "text": pages[page - 1] }))
        .collect();
    let mut result = json!({
        "file_type": "pdf",
        "total_pages": total_pages,
        "parsed_pages": content.len(),
        "content": content,
    });
    if total_pages == 1 && wanted.is_some_and(|numbers| !numbers.is_empty()) {
        result["note"] = json!("page boundaries were not detected; returned the whole document");
    }
    result
}
