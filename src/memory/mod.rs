//! Token-bounded conversation memory.
//!
//! The prompt sent to the model is `system_content + plan + summary_memory +
//! memory`. Live turns accumulate in `memory`; when its token total crosses
//! the budget the oldest turns are summarized into `summary_memory`, which is
//! in turn re-summarized against its own budget. History is condensed, never
//! silently truncated: a failed summary aborts the turn and leaves the state
//! untouched.

mod compaction;

use crate::api::ModelClient;
use crate::config::MemoryConfig;
use crate::error::ApiError;
use crate::tokens::{counter_for_model, message_cost, TokenCounter};
use crate::types::{FunctionCall, Message};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use compaction::{split_on_token_limit, summary_request, total_tokens};
pub use compaction::{CompactionReport, SUMMARY_PREFIX};

/// A message plus its immutable token cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    #[serde(flatten)]
    pub message: Message,
    pub token_count: usize,
}

/// Token budgets for the live and summary sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimits {
    pub memory_max_tokens: usize,
    pub summary_memory_max_tokens: usize,
}

impl From<MemoryConfig> for MemoryLimits {
    fn from(config: MemoryConfig) -> Self {
        Self {
            memory_max_tokens: config.memory_max_tokens,
            summary_memory_max_tokens: config.summary_memory_max_tokens,
        }
    }
}

/// Persisted shape of the full conversation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub system_content: Vec<MemoryEntry>,
    pub summary_memory: Vec<MemoryEntry>,
    pub memory: Vec<MemoryEntry>,
}

/// Owner of the conversation state for one run.
pub struct MemoryManager {
    model: String,
    counter: Arc<dyn TokenCounter>,
    limits: MemoryLimits,
    system_content: MemoryEntry,
    plan: Option<MemoryEntry>,
    summary_memory: Vec<MemoryEntry>,
    memory: Vec<MemoryEntry>,
}

impl MemoryManager {
    /// Start a conversation from `system_prompt`, counting with `model`'s tokenizer.
    pub fn new(system_prompt: impl Into<String>, model: impl Into<String>, limits: MemoryLimits) -> Self {
        let model = model.into();
        let counter = counter_for_model(&model);
        Self::with_counter(system_prompt, model, limits, counter)
    }

    pub fn with_counter(
        system_prompt: impl Into<String>,
        model: impl Into<String>,
        limits: MemoryLimits,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        let system_content = entry_for(counter.as_ref(), Message::system(system_prompt));
        Self {
            model: model.into(),
            counter,
            limits,
            system_content,
            plan: None,
            summary_memory: Vec::new(),
            memory: Vec::new(),
        }
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.push(Message::user(text));
    }

    pub fn append_function_result(&mut self, name: impl Into<String>, output: impl Into<String>) {
        self.push(Message::function_result(name, output));
    }

    pub fn append_assistant(&mut self, content: Option<String>, function_call: Option<FunctionCall>) {
        self.push(Message::assistant(content, function_call));
    }

    fn push(&mut self, message: Message) {
        let entry = entry_for(self.counter.as_ref(), message);
        debug!(role = ?entry.message.role, tokens = entry.token_count, "memory append");
        self.memory.push(entry);
    }

    /// Store the current plan; it is rendered right after the system prompt.
    pub fn set_plan(&mut self, plan: impl Into<String>) {
        self.plan = Some(entry_for(self.counter.as_ref(), Message::system(plan)));
    }

    /// Wire messages in chronological order, bookkeeping stripped.
    pub fn render(&self) -> Vec<Message> {
        self.ordered().map(|entry| entry.message.clone()).collect()
    }

    /// Same order as [`render`](Self::render), with token counts.
    pub fn entries(&self) -> Vec<MemoryEntry> {
        self.ordered().cloned().collect()
    }

    fn ordered(&self) -> impl Iterator<Item = &MemoryEntry> {
        std::iter::once(&self.system_content)
            .chain(self.plan.iter())
            .chain(self.summary_memory.iter())
            .chain(self.memory.iter())
    }

    pub fn memory(&self) -> &[MemoryEntry] {
        &self.memory
    }

    pub fn summary_memory(&self) -> &[MemoryEntry] {
        &self.summary_memory
    }

    pub fn memory_tokens(&self) -> usize {
        total_tokens(&self.memory)
    }

    pub fn summary_tokens(&self) -> usize {
        total_tokens(&self.summary_memory)
    }

    pub fn limits(&self) -> MemoryLimits {
        self.limits
    }

    /// Bring both sequences back under budget, summarizing as needed.
    ///
    /// At most two model calls are made: one for the evicted live turns and
    /// one folding the old part of `summary_memory` into a single entry at
    /// its front. After the second call everything behind that entry fits
    /// the summary budget; the entry itself is folded again on a later call
    /// if the total is still over.
    ///
    /// Returns `Ok(None)` when nothing was over budget. Any summarization
    /// failure is returned before state is modified.
    pub async fn maybe_compact(
        &mut self,
        client: &dyn ModelClient,
    ) -> Result<Option<CompactionReport>, ApiError> {
        let mut report = CompactionReport::default();

        if self.memory_tokens() > self.limits.memory_max_tokens {
            let boundary = split_on_token_limit(&self.memory, self.limits.memory_max_tokens);
            if boundary > 0 {
                let summary = self.summarize(client, &self.memory[..boundary]).await?;
                self.memory.drain(..boundary);
                let entry = self.summary_entry(&summary);
                self.summary_memory.push(entry);
                report.evicted_messages = boundary;
                report.summary_calls += 1;
            }
        }

        if self.summary_tokens() > self.limits.summary_memory_max_tokens {
            let boundary =
                split_on_token_limit(&self.summary_memory, self.limits.summary_memory_max_tokens);
            if boundary > 0 {
                let summary = self
                    .summarize(client, &self.summary_memory[..boundary])
                    .await?;
                self.summary_memory.drain(..boundary);
                let entry = self.summary_entry(&summary);
                self.summary_memory.insert(0, entry);
                report.resummarized_messages = boundary;
                report.summary_calls += 1;
            }
            if self.summary_tokens() > self.limits.summary_memory_max_tokens {
                debug!(
                    tokens = self.summary_tokens(),
                    limit = self.limits.summary_memory_max_tokens,
                    "summary memory over budget until the next compaction"
                );
            }
        }

        if report.summary_calls == 0 {
            return Ok(None);
        }
        report.memory_tokens_after = self.memory_tokens();
        report.summary_tokens_after = self.summary_tokens();
        info!(
            evicted = report.evicted_messages,
            resummarized = report.resummarized_messages,
            memory_tokens = report.memory_tokens_after,
            summary_tokens = report.summary_tokens_after,
            "compacted conversation memory"
        );
        Ok(Some(report))
    }

    /// Ask the model to condense `slice` into prose; returns the reply verbatim.
    pub async fn summarize(
        &self,
        client: &dyn ModelClient,
        slice: &[MemoryEntry],
    ) -> Result<String, ApiError> {
        let request = summary_request(&self.model, slice);
        let reply = client.chat(&request).await?.into_reply()?;
        reply
            .reasoning
            .ok_or_else(|| ApiError::InvalidResponse("summary reply had no content".into()))
    }

    fn summary_entry(&self, summary: &str) -> MemoryEntry {
        entry_for(
            self.counter.as_ref(),
            Message::system(format!("{SUMMARY_PREFIX}{summary}")),
        )
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            system_content: std::iter::once(&self.system_content)
                .chain(self.plan.iter())
                .cloned()
                .collect(),
            summary_memory: self.summary_memory.clone(),
            memory: self.memory.clone(),
        }
    }

    /// Write the full state, token counts included, as pretty JSON.
    pub fn persist(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot()).map_err(io::Error::other)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, path)?;
        info!(path = %path.display(), messages = self.memory.len(), "memory persisted");
        Ok(())
    }
}

fn entry_for(counter: &dyn TokenCounter, message: Message) -> MemoryEntry {
    let token_count = message_cost(counter, &message);
    MemoryEntry {
        message,
        token_count,
    }
}
