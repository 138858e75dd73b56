//! Character budget enforcement.

use crate::types::char_len;

/// First `max_chars` characters of `text`, with trailing whitespace trimmed.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Apply the `[min_chars, max_chars]` window to `content`.
///
/// Long content is truncated and a warning recorded. Short content is kept as is and only
/// flagged.
pub fn enforce(
    content: String,
    min_chars: usize,
    max_chars: usize,
    warnings: &mut Vec<String>,
) -> String {
    let len = char_len(&content);
    if len > max_chars {
        warnings.push(format!("content_md trimmed to max_chars={}.", max_chars));
        return truncate_chars(&content, max_chars);
    }
    if len < min_chars {
        warnings.push(format!(
            "content_md shorter than target ({} < {}).",
            len, min_chars
        ));
    }
    content
}
