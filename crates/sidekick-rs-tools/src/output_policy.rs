//! Truncation and redaction applied to tool results before they reach the model.

use serde_json::{Map, Value};
use sidekick_rs_config::ToolOutputPolicyConfig;

/// Marker appended to strings cut at the byte limit.
const TRUNCATION_MARKER: &str = "...";

/// Policy that redacts secrets and bounds the size of tool outputs.
#[derive(Debug, Clone)]
pub struct ToolOutputPolicy {
    /// Maximum size of string fields in bytes.
    pub max_string_bytes: usize,
    /// Maximum number of elements in arrays.
    pub max_array_len: usize,
    /// Maximum number of object entries.
    pub max_object_entries: usize,
    /// Key names whose values are replaced.
    pub redact_keys: Vec<String>,
    /// Substrings that cause a string value to be replaced.
    pub redact_values: Vec<String>,
    /// Replacement text for redacted values.
    pub replacement: String,
}

impl Default for ToolOutputPolicy {
    fn default() -> Self {
        Self::from(&ToolOutputPolicyConfig::default())
    }
}

impl From<&ToolOutputPolicyConfig> for ToolOutputPolicy {
    fn from(config: &ToolOutputPolicyConfig) -> Self {
        let mut redact_keys = config.redact_keys.clone();
        // Credentials echoed back by an upstream API never reach the model.
        for key in ["api_key", "apikey", "key", "authorization"] {
            if !redact_keys.iter().any(|entry| entry.eq_ignore_ascii_case(key)) {
                redact_keys.push(key.to_string());
            }
        }
        Self {
            max_string_bytes: config.max_string_bytes,
            max_array_len: config.max_array_len,
            max_object_entries: config.max_object_entries,
            redact_keys,
            redact_values: config.redact_values.clone(),
            replacement: config.replacement.clone(),
        }
    }
}

impl ToolOutputPolicy {
    /// Apply the policy to a JSON value.
    pub fn apply(&self, value: Value) -> Value {
        match value {
            Value::String(text) => Value::String(self.apply_string(text)),
            Value::Array(values) => Value::Array(
                values
                    .into_iter()
                    .take(self.max_array_len)
                    .map(|value| self.apply(value))
                    .collect(),
            ),
            Value::Object(values) => {
                let mut trimmed = Map::with_capacity(values.len().min(self.max_object_entries));
                for (key, value) in values.into_iter().take(self.max_object_entries) {
                    let value = if self.should_redact_key(&key) {
                        Value::String(self.replacement.clone())
                    } else {
                        self.apply(value)
                    };
                    trimmed.insert(key, value);
                }
                Value::Object(trimmed)
            }
            value => value,
        }
    }

    fn apply_string(&self, value: String) -> String {
        if self.should_redact_value(&value) {
            return self.replacement.clone();
        }
        self.truncate_string(value)
    }

    fn should_redact_key(&self, key: &str) -> bool {
        self.redact_keys
            .iter()
            .any(|entry| entry.eq_ignore_ascii_case(key))
    }

    fn should_redact_value(&self, value: &str) -> bool {
        if self.redact_values.is_empty() {
            return false;
        }
        let lowered = value.to_ascii_lowercase();
        self.redact_values
            .iter()
            .any(|entry| lowered.contains(&entry.to_ascii_lowercase()))
    }

    /// Cut a string at a char boundary within the byte limit, marking the cut.
    fn truncate_string(&self, value: String) -> String {
        let max_bytes = self.max_string_bytes;
        if value.len() <= max_bytes {
            return value;
        }
        if max_bytes <= TRUNCATION_MARKER.len() {
            return String::new();
        }
        let budget = max_bytes - TRUNCATION_MARKER.len();
        let end = value
            .char_indices()
            .map(|(idx, ch)| idx + ch.len_utf8())
            .take_while(|next| *next <= budget)
            .last()
            .unwrap_or(0);
        format!("{}{TRUNCATION_MARKER}", &value[..end])
    }
}
