//! Split and summary-request helpers for conversation compaction.

use super::MemoryEntry;
use crate::types::{ChatRequest, Message};

/// Prefix of every synthesized summary message.
pub const SUMMARY_PREFIX: &str = "Summary of previous conversation: ";
/// Instruction sent with every summarization request.
pub(super) const SUMMARY_INSTRUCTION: &str =
    "Summarize the following conversation for context retention.";

/// Details about one `maybe_compact` call that did work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Live messages folded into a new summary.
    pub evicted_messages: usize,
    /// Summary messages folded into a summary-of-summaries.
    pub resummarized_messages: usize,
    /// Summarization requests issued.
    pub summary_calls: usize,
    pub memory_tokens_after: usize,
    pub summary_tokens_after: usize,
}

pub(super) fn total_tokens(entries: &[MemoryEntry]) -> usize {
    entries.iter().map(|entry| entry.token_count).sum()
}

/// Index splitting `entries` into `[..index]` (old) and `[index..]` (kept).
///
/// Scans from the newest entry backward and stops at the first entry that
/// pushes the running total over `limit`; that entry and everything older is
/// old. An entry that lands exactly on the limit is kept. The newest entry is
/// always kept, even when it alone exceeds the limit.
pub(super) fn split_on_token_limit(entries: &[MemoryEntry], limit: usize) -> usize {
    let mut running = 0usize;
    for (index, entry) in entries.iter().enumerate().rev() {
        running = running.saturating_add(entry.token_count);
        if running > limit {
            return if index + 1 == entries.len() {
                index
            } else {
                index + 1
            };
        }
    }
    0
}

/// One summary input line: `"<Role>: <content-or-call>"`.
pub(super) fn describe_entry(entry: &MemoryEntry) -> String {
    let message = &entry.message;
    let mut text = message.content.clone().unwrap_or_default();
    if let Some(call) = &message.function_call {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&format!("[called {} with {}]", call.name, call.arguments));
    }
    match &message.name {
        Some(name) => format!("{} ({name}): {text}", message.role.label()),
        None => format!("{}: {text}", message.role.label()),
    }
}

/// Build the synthetic request asking the model to condense `entries`.
pub(super) fn summary_request(model: &str, entries: &[MemoryEntry]) -> ChatRequest {
    let transcript: Vec<String> = entries.iter().map(describe_entry).collect();
    ChatRequest::new(
        model,
        vec![
            Message::system(SUMMARY_INSTRUCTION),
            Message::user(transcript.join("\n")),
        ],
    )
}
