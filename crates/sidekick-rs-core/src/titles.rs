//! Conversation titles derived from the first assistant reply.

use sidekick_rs_llm::{ChatMessage, ChatRequest};

/// Number of reply characters considered when titling a conversation.
pub const TITLE_SOURCE_CHARS: usize = 200;

const TITLE_SYSTEM_PROMPT: &str = "You write conversation titles. Read the assistant reply and \
answer with three short candidate titles separated by commas. Each title has at most five words. \
Return only the titles: no numbering, no quotes, no explanation, no line breaks.";

const TITLE_SEPARATORS: [char; 3] = [',', '，', '、'];

/// Request asking the model to title a conversation from its reply.
pub fn title_request(reply: &str) -> ChatRequest {
    let excerpt: String = reply.chars().take(TITLE_SOURCE_CHARS).collect();
    ChatRequest {
        temperature: Some(0.3),
        max_output_tokens: Some(64),
        ..ChatRequest::new(vec![
            ChatMessage::system(TITLE_SYSTEM_PROMPT),
            ChatMessage::user(format!("Assistant reply: {excerpt}")),
        ])
    }
}

/// Pick the first usable candidate from a title model reply.
pub fn parse_title_reply(reply: &str, max_chars: usize) -> Option<String> {
    let flat = reply.trim().replace(['\r', '\n'], " ");
    flat.split(TITLE_SEPARATORS)
        .map(clean_candidate)
        .find(|candidate| !candidate.is_empty() && candidate.chars().count() <= max_chars)
}

/// Title condensed locally from the start of a reply.
///
/// Takes the first sentence of the leading excerpt, strips markdown
/// decoration, and clips it to `max_chars` characters.
pub fn suggest_title(reply: &str, max_chars: usize) -> Option<String> {
    if max_chars == 0 {
        return None;
    }
    let excerpt: String = reply.chars().take(TITLE_SOURCE_CHARS).collect();
    let line = excerpt
        .lines()
        .map(clean_candidate)
        .find(|line| !line.is_empty())?;
    let sentence = line
        .split_inclusive(['.', '!', '?', '。', '！', '？'])
        .next()
        .unwrap_or(line.as_str())
        .trim_end_matches(['.', '!', '?', '。', '！', '？'])
        .trim()
        .to_string();
    if sentence.chars().count() <= max_chars {
        return Some(sentence);
    }
    let clipped: String = sentence.chars().take(max_chars).collect();
    Some(clipped.trim_end().to_string())
}

fn clean_candidate(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|ch| !matches!(ch, '"' | '\'' | '*' | '`' | '《' | '》' | '#' | '>'))
        .collect();
    let stripped = stripped.trim();
    let without_number = stripped
        .trim_start_matches(|ch: char| ch.is_ascii_digit())
        .trim_start_matches(['.', '、', ')'])
        .trim();
    let candidate = if without_number.is_empty() {
        stripped
    } else {
        without_number
    };
    candidate.trim_end_matches('。').trim().to_string()
}
