//! Helpers for resolving and displaying credentials.

/// Prefer a non-empty inline value, otherwise read the named environment variable.
pub fn resolve_secret(inline: Option<&str>, env_key: &str) -> Option<String> {
    if let Some(value) = inline.map(str::trim).filter(|value| !value.is_empty()) {
        return Some(value.to_string());
    }
    if env_key.trim().is_empty() {
        return None;
    }
    std::env::var(env_key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Mask a secret for display, keeping a 4-char prefix and 2-char suffix.
pub fn mask_secret(value: &str) -> String {
    const PREFIX: usize = 4;
    const SUFFIX: usize = 2;
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= PREFIX + SUFFIX {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..PREFIX].iter().collect();
    let tail: String = chars[chars.len() - SUFFIX..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - PREFIX - SUFFIX))
}
