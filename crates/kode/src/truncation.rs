/// Default cap on the size of any tool result handed back to the model
pub const MAX_TOOL_RESULT_CHARS: usize = 100_000;

/// Cut `text` to at most `limit` characters, appending a marker with the number of dropped
/// characters. Counts characters rather than bytes so the cut never splits a code point.
pub fn clamp_text(text: &str, limit: usize) -> String {
    let total = text.chars().count();
    if total <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit).collect();
    format!("{}\n...<truncated {} chars>", kept, total - limit)
}
