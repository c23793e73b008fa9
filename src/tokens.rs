//! Token estimation and usage tracking.
//!
//! Message costs follow the chat-format accounting: a fixed structural
//! overhead, the tokenizer count of the message text, and a fixed priming
//! overhead. Text is counted with the model's BPE encoding when tiktoken
//! knows the model, and with a ~4 chars per token heuristic otherwise.

use crate::types::Message;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::debug;

/// Tokens charged per message for role and delimiters.
pub const MESSAGE_STRUCTURE_TOKENS: usize = 4;
/// Tokens charged per message for start/end priming.
pub const MESSAGE_PRIMING_TOKENS: usize = 2;

/// Counts tokens in a piece of text for the active model.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Character-based estimate: one token per four characters, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Exact count with the model's tiktoken encoding.
pub struct BpeCounter {
    bpe: CoreBPE,
}

impl BpeCounter {
    /// `None` when tiktoken has no encoding for `model`.
    pub fn for_model(model: &str) -> Option<Self> {
        tiktoken_rs::get_bpe_from_model(model)
            .ok()
            .map(|bpe| Self { bpe })
    }
}

impl TokenCounter for BpeCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Tokenizer for `model`, falling back to [`HeuristicCounter`].
pub fn counter_for_model(model: &str) -> Arc<dyn TokenCounter> {
    match BpeCounter::for_model(model) {
        Some(counter) => Arc::new(counter),
        None => {
            debug!(model, "no tiktoken encoding for model; using heuristic token counts");
            Arc::new(HeuristicCounter)
        }
    }
}

/// Total cost of one message, overheads included.
pub fn message_cost(counter: &dyn TokenCounter, message: &Message) -> usize {
    let mut tokens = MESSAGE_STRUCTURE_TOKENS;
    if let Some(content) = &message.content {
        tokens += counter.count(content);
    }
    if let Some(call) = &message.function_call {
        tokens += counter.count(&call.name);
        tokens += counter.count(&call.arguments);
    }
    if let Some(name) = &message.name {
        tokens += counter.count(name);
    }
    tokens + MESSAGE_PRIMING_TOKENS
}

/// Tracks token usage reported by the API across a run.
#[derive(Debug, Clone, Default)]
pub struct TokenTracker {
    /// Running total of prompt tokens sent.
    pub total_prompt_tokens: u64,
    /// Running total of completion tokens received.
    pub total_completion_tokens: u64,
    /// Prompt tokens in the most recent request.
    pub last_prompt_tokens: u64,
    /// Completion tokens in the most recent response.
    pub last_completion_tokens: u64,
}

impl TokenTracker {
    /// Record token counts from an API response's `usage` field.
    pub fn record(&mut self, prompt_tokens: u64, completion_tokens: u64) {
        self.last_prompt_tokens = prompt_tokens;
        self.last_completion_tokens = completion_tokens;
        self.total_prompt_tokens = self.total_prompt_tokens.saturating_add(prompt_tokens);
        self.total_completion_tokens = self
            .total_completion_tokens
            .saturating_add(completion_tokens);
    }

    /// Total tokens consumed across the entire run.
    pub fn session_total(&self) -> u64 {
        self.total_prompt_tokens
            .saturating_add(self.total_completion_tokens)
    }
}
