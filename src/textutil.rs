//! Character-safe previews for console output.
//!
//! Command arguments and results can be long and multi-line; the console
//! shows a one-line excerpt while the transcript keeps the full text.

/// Truncate by characters and append `suffix` when truncation occurs.
pub fn truncate_with_suffix_by_chars(text: &str, max_chars: usize, suffix: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max_chars).collect();
    format!("{prefix}{suffix}")
}

/// Flatten whitespace runs (newlines included) into single spaces.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One-line excerpt of at most `max_chars` characters plus an ellipsis.
pub fn preview(text: &str, max_chars: usize) -> String {
    truncate_with_suffix_by_chars(&single_line(text), max_chars, "...")
}
