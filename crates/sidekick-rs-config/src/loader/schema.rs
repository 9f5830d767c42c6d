//! Schema validation helpers for Sidekick JSON5 configuration.
//!
//! Every layer is checked before merging so that typos surface with the
//! layer name and the dotted key path instead of a serde message.

use crate::ConfigError;
use serde_json::{Map, Value};

const PROVIDER_KINDS: &[&str] = &["gemini", "openai_compatible"];
const SEARCH_ENGINES: &[&str] = &["baidu", "google"];

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    ensure_allowed_keys(
        map,
        &[
            "$schema",
            "providers",
            "proxy",
            "search",
            "tools",
            "chat",
            "attachments",
            "sessions",
            "imagegen",
        ],
        layer,
        "",
    )?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("providers") {
        validate_providers(value, layer, "providers")?;
    }
    if let Some(value) = map.get("proxy") {
        let map = expect_object(value, layer, "proxy")?;
        ensure_allowed_keys(map, &["enabled", "url"], layer, "proxy")?;
        check_fields(map, layer, "proxy", &[("enabled", expect_bool), ("url", expect_string)])?;
    }
    if let Some(value) = map.get("search") {
        validate_search(value, layer, "search")?;
    }
    if let Some(value) = map.get("tools") {
        validate_tools(value, layer, "tools")?;
    }
    if let Some(value) = map.get("chat") {
        let map = expect_object(value, layer, "chat")?;
        ensure_allowed_keys(
            map,
            &["system_prompt", "tool_guidance", "stream", "title_max_chars"],
            layer,
            "chat",
        )?;
        check_fields(
            map,
            layer,
            "chat",
            &[
                ("system_prompt", expect_string),
                ("tool_guidance", expect_bool),
                ("stream", expect_bool),
                ("title_max_chars", expect_u64),
            ],
        )?;
    }
    if let Some(value) = map.get("attachments") {
        let map = expect_object(value, layer, "attachments")?;
        ensure_allowed_keys(
            map,
            &[
                "inline_max_bytes",
                "max_file_bytes",
                "retention_hours",
                "poll_interval_ms",
                "poll_timeout_secs",
                "cache_path",
            ],
            layer,
            "attachments",
        )?;
        check_fields(
            map,
            layer,
            "attachments",
            &[
                ("inline_max_bytes", expect_u64),
                ("max_file_bytes", expect_u64),
                ("retention_hours", expect_u64),
                ("poll_interval_ms", expect_u64),
                ("poll_timeout_secs", expect_u64),
                ("cache_path", expect_string),
            ],
        )?;
    }
    if let Some(value) = map.get("sessions") {
        let map = expect_object(value, layer, "sessions")?;
        ensure_allowed_keys(map, &["enabled", "path"], layer, "sessions")?;
        check_fields(
            map,
            layer,
            "sessions",
            &[("enabled", expect_bool), ("path", expect_string)],
        )?;
    }
    if let Some(value) = map.get("imagegen") {
        validate_imagegen(value, layer, "imagegen")?;
    }
    Ok(())
}

/// Validate the "providers" block.
fn validate_providers(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["current", "entries"], layer, path)?;
    if let Some(value) = map.get("current") {
        expect_string(value, layer, &join_path(path, "current"))?;
    }
    let Some(entries) = map.get("entries") else {
        return Ok(());
    };
    let entries_path = join_path(path, "entries");
    for (id, entry) in expect_object(entries, layer, &entries_path)? {
        let entry_path = join_path(&entries_path, id);
        let entry = expect_object(entry, layer, &entry_path)?;
        ensure_allowed_keys(
            entry,
            &[
                "kind",
                "display_name",
                "api_url",
                "model",
                "api_key",
                "api_key_env",
                "context_limit",
                "use_proxy",
                "timeout_secs",
                "temperature",
                "max_output_tokens",
            ],
            layer,
            &entry_path,
        )?;
        if let Some(kind) = entry.get("kind") {
            expect_enum(kind, PROVIDER_KINDS, layer, &join_path(&entry_path, "kind"))?;
        }
        check_fields(
            entry,
            layer,
            &entry_path,
            &[
                ("display_name", expect_string),
                ("api_url", expect_string),
                ("model", expect_string),
                ("api_key", expect_string),
                ("api_key_env", expect_string),
                ("context_limit", expect_u64),
                ("use_proxy", expect_bool),
                ("timeout_secs", expect_u64),
                ("temperature", expect_f64),
                ("max_output_tokens", expect_u64),
            ],
        )?;
    }
    Ok(())
}

/// Validate the "search" block.
fn validate_search(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "enabled_engines",
            "primary_engine",
            "fallback_enabled",
            "baidu",
            "google",
        ],
        layer,
        path,
    )?;
    if let Some(value) = map.get("enabled_engines") {
        let engines_path = join_path(path, "enabled_engines");
        for (idx, engine) in expect_array(value, layer, &engines_path)?.iter().enumerate() {
            expect_enum(engine, SEARCH_ENGINES, layer, &format!("{engines_path}[{idx}]"))?;
        }
    }
    if let Some(value) = map.get("primary_engine") {
        expect_enum(value, SEARCH_ENGINES, layer, &join_path(path, "primary_engine"))?;
    }
    if let Some(value) = map.get("fallback_enabled") {
        expect_bool(value, layer, &join_path(path, "fallback_enabled"))?;
    }
    if let Some(value) = map.get("baidu") {
        let baidu_path = join_path(path, "baidu");
        let baidu = expect_object(value, layer, &baidu_path)?;
        ensure_allowed_keys(
            baidu,
            &["api_url", "api_key", "api_key_env", "timeout_secs"],
            layer,
            &baidu_path,
        )?;
        check_fields(
            baidu,
            layer,
            &baidu_path,
            &[
                ("api_url", expect_string),
                ("api_key", expect_string),
                ("api_key_env", expect_string),
                ("timeout_secs", expect_u64),
            ],
        )?;
    }
    if let Some(value) = map.get("google") {
        let google_path = join_path(path, "google");
        let google = expect_object(value, layer, &google_path)?;
        ensure_allowed_keys(
            google,
            &[
                "api_url",
                "api_key",
                "api_key_env",
                "engine_id",
                "engine_id_env",
                "timeout_secs",
            ],
            layer,
            &google_path,
        )?;
        check_fields(
            google,
            layer,
            &google_path,
            &[
                ("api_url", expect_string),
                ("api_key", expect_string),
                ("api_key_env", expect_string),
                ("engine_id", expect_string),
                ("engine_id_env", expect_string),
                ("timeout_secs", expect_u64),
            ],
        )?;
    }
    Ok(())
}

/// Validate the global tools block.
fn validate_tools(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["output_policy", "disabled"], layer, path)?;
    if let Some(value) = map.get("disabled") {
        validate_string_array(value, layer, &join_path(path, "disabled"))?;
    }
    let Some(value) = map.get("output_policy") else {
        return Ok(());
    };
    let policy_path = join_path(path, "output_policy");
    let policy = expect_object(value, layer, &policy_path)?;
    ensure_allowed_keys(
        policy,
        &[
            "max_string_bytes",
            "max_array_len",
            "max_object_entries",
            "redact_keys",
            "redact_values",
            "replacement",
        ],
        layer,
        &policy_path,
    )?;
    check_fields(
        policy,
        layer,
        &policy_path,
        &[
            ("max_string_bytes", expect_u64),
            ("max_array_len", expect_u64),
            ("max_object_entries", expect_u64),
            ("redact_keys", validate_string_array),
            ("redact_values", validate_string_array),
            ("replacement", expect_string),
        ],
    )
}

/// Validate the "imagegen" block.
fn validate_imagegen(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "api_url",
            "output_dir",
            "timeout_secs",
            "sampler",
            "scheduler",
            "steps",
            "cfg_scale",
            "width",
            "height",
            "seed",
            "negative_prompt",
        ],
        layer,
        path,
    )?;
    check_fields(
        map,
        layer,
        path,
        &[
            ("api_url", expect_string),
            ("output_dir", expect_string),
            ("timeout_secs", expect_u64),
            ("sampler", expect_string),
            ("scheduler", expect_string),
            ("steps", expect_u64),
            ("cfg_scale", expect_f64),
            ("width", expect_u64),
            ("height", expect_u64),
            ("seed", expect_i64),
            ("negative_prompt", expect_string),
        ],
    )
}

type FieldCheck = fn(&Value, &str, &str) -> Result<(), ConfigError>;

/// Apply a type check to every listed field that is present.
fn check_fields(
    map: &Map<String, Value>,
    layer: &str,
    path: &str,
    fields: &[(&str, FieldCheck)],
) -> Result<(), ConfigError> {
    for (key, check) in fields {
        if let Some(value) = map.get(*key) {
            check(value, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| invalid_field(layer, path, "expected object"))
}

fn expect_array<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Vec<Value>, ConfigError> {
    value
        .as_array()
        .ok_or_else(|| invalid_field(layer, path, "expected array"))
}

fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    match value {
        Value::String(_) => Ok(()),
        _ => Err(invalid_field(layer, path, "expected string")),
    }
}

fn expect_bool(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    match value {
        Value::Bool(_) => Ok(()),
        _ => Err(invalid_field(layer, path, "expected bool")),
    }
}

fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

fn expect_i64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_i64() || value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected integer"))
    }
}

fn expect_f64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_number() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected number"))
    }
}

/// Expect a string drawn from a fixed set of values.
fn expect_enum(
    value: &Value,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    match value.as_str() {
        Some(value) if allowed.contains(&value) => Ok(()),
        _ => Err(invalid_field(
            layer,
            path,
            &format!("expected one of: {}", allowed.join(", ")),
        )),
    }
}

fn validate_string_array(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    for (idx, entry) in expect_array(value, layer, path)?.iter().enumerate() {
        expect_string(entry, layer, &format!("{path}[{idx}]"))?;
    }
    Ok(())
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(invalid_field(layer, &join_path(path, key), "unknown key")),
        None => Ok(()),
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{path}"),
        message: message.to_string(),
    }
}
