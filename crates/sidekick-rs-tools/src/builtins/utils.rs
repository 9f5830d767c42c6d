//! Utility helpers shared by built-in tools.

use serde::de::DeserializeOwned;
use serde_json::Value;
use sidekick_rs_protocol::ToolError;

/// Parse JSON args into a typed struct for tool calls.
pub(super) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|err| ToolError::InvalidArguments(err.to_string()))
}

/// Trim entries and drop empties and duplicates, keeping first-seen order.
pub(super) fn clean_list(values: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !cleaned.iter().any(|seen| seen == value) {
            cleaned.push(value.to_string());
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::{clean_list, parse_args};
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use sidekick_rs_protocol::ToolError;

    #[test]
    fn parse_args_reads_struct_fields() {
        #[derive(Deserialize)]
        struct Args {
            name: String,
        }

        let args: Args = parse_args(serde_json::json!({ "name": "sidekick" })).expect("args");
        assert_eq!(args.name, "sidekick".to_string());

        let err = parse_args::<Args>(serde_json::json!({})).err().expect("missing");
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn clean_list_trims_and_dedups() {
        let cleaned = clean_list(vec![
            " a.com ".to_string(),
            String::new(),
            "a.com".to_string(),
            "b.com".to_string(),
        ]);
        assert_eq!(cleaned, vec!["a.com", "b.com"]);
    }
}
