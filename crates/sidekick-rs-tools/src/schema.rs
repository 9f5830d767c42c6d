//! Argument validation against the JSON schema a tool declares.
//!
//! Optional fields sent as explicit nulls are treated as absent, since models
//! often fill every declared property. Failures name the offending argument
//! as a dotted path, e.g. `` `site_filter[1]` ``.

use jsonschema::ValidationError;
use serde_json::{Map, Value};
use sidekick_rs_protocol::ToolError;

/// Validate tool arguments against a declared schema.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|err| ToolError::InvalidArguments(format!("invalid tool schema: {err}")))?;
    let args = without_nulls(args);
    match validator.iter_errors(&args).next() {
        Some(err) => Err(ToolError::InvalidArguments(describe(&err))),
        None => Ok(()),
    }
}

fn without_nulls(args: &Value) -> Value {
    match args {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

fn describe(err: &ValidationError<'_>) -> String {
    let pointer = err.instance_path.to_string();
    format!("{}: {err}", display_path(&pointer_to_path(&pointer)))
}

/// Render a JSON pointer such as `/site_filter/1` as `site_filter[1]`.
fn pointer_to_path(pointer: &str) -> String {
    let mut path = String::new();
    for segment in pointer.split('/').filter(|segment| !segment.is_empty()) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        if segment.parse::<usize>().is_ok() && !path.is_empty() {
            path.push_str(&format!("[{segment}]"));
        } else {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(&segment);
        }
    }
    path
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "arguments".to_string()
    } else {
        format!("`{path}`")
    }
}
