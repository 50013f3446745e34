//! Salvaging JSON from model output.
//!
//! Models asked for strict JSON still wrap it in prose or code fences often
//! enough that a direct parse cannot be the only path. Extraction tries, in
//! order: the raw text, the body of a fenced code block, and the longest
//! balanced `{...}` or `[...]` span.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence regex")
});

/// Extract the first parseable JSON value from `text`, or `None` when no
/// strategy yields one.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    for captures in FENCE_RE.captures_iter(text) {
        if let Ok(value) = serde_json::from_str::<Value>(captures[1].trim()) {
            return Some(value);
        }
    }
    balanced_span(text).and_then(|span| serde_json::from_str(span).ok())
}

/// The first balanced top-level `{...}` or `[...]` span, tracking string
/// literals so braces inside strings do not confuse the depth count.
fn balanced_span(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find(['{', '['])?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
