//! Commands that talk back to the model or the orchestrator:
//! `summarize_file` and `make_plan`.

use crate::commands::schema::{CommandInput, FieldKind, InputSchema};
use crate::commands::{CommandDescriptor, CommandHandler, ContextEvent, ExecutionContext};
use crate::error::CommandError;
use crate::types::{ChatRequest, Message};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Characters of file content sent for summarization by default.
const DEFAULT_SUMMARY_CHARS: i64 = 4000;
const FILE_SUMMARY_INSTRUCTION: &str =
    "Summarize the following file content concisely for a software engineer.";

// ---------------------------------------------------------------------------
// summarize_file
// ---------------------------------------------------------------------------

pub struct SummarizeFile;

impl SummarizeFile {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "summarize_file",
            InputSchema::new()
                .required("filepath", FieldKind::String, "File to summarize.")
                .optional(
                    "max_chars",
                    FieldKind::Integer,
                    "Only the first max_chars characters are summarized. Defaults to 4000.",
                ),
            Arc::new(Self),
        )
    }
}

async fn summarize_text(ctx: &ExecutionContext, text: &str) -> Result<String, String> {
    let mut request = ChatRequest::new(
        ctx.model.clone(),
        vec![
            Message::system(FILE_SUMMARY_INSTRUCTION),
            Message::user(text),
        ],
    );
    request.temperature = ctx.config.api.temperature;
    let reply = ctx
        .client
        .chat(&request)
        .await
        .and_then(|response| response.into_reply())
        .map_err(|e| e.to_string())?;
    reply
        .reasoning
        .filter(|summary| !summary.trim().is_empty())
        .ok_or_else(|| "the model returned no summary".to_string())
}

#[async_trait]
impl CommandHandler for SummarizeFile {
    fn name(&self) -> &str {
        "summarize_file"
    }

    fn description(&self) -> &str {
        "Ask the model for a short summary of a file's content."
    }

    async fn run(&self, input: &CommandInput, ctx: &ExecutionContext) -> Result<String, CommandError> {
        let filepath = input.require_str("filepath")?;
        let max_chars = input.int("max_chars").unwrap_or(DEFAULT_SUMMARY_CHARS);
        if max_chars < 1 {
            return Err(CommandError::InvalidInput("max_chars must be >= 1".into()));
        }
        if !Path::new(filepath).is_file() {
            return Ok(format!("[ERROR] File not found: {filepath}"));
        }
        let content = match tokio::fs::read_to_string(filepath).await {
            Ok(content) => content,
            Err(e) => return Ok(format!("[ERROR] Could not read or summarize file: {e}")),
        };
        if content.trim().is_empty() {
            return Ok("[INFO] File is empty or only contains whitespace.".into());
        }
        let limit = usize::try_from(max_chars).unwrap_or(usize::MAX);
        let excerpt: String = content.chars().take(limit).collect();
        Ok(match summarize_text(ctx, &excerpt).await {
            Ok(summary) => format!("[OK] Summary:\n{summary}"),
            Err(message) => format!("[ERROR] Could not read or summarize file: {message}"),
        })
    }
}

// ---------------------------------------------------------------------------
// make_plan
// ---------------------------------------------------------------------------

pub struct MakePlan;

impl MakePlan {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "make_plan",
            InputSchema::new().required(
                "plan",
                FieldKind::String,
                "The full plan, e.g. a numbered list of steps.",
            ),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl CommandHandler for MakePlan {
    fn name(&self) -> &str {
        "make_plan"
    }

    fn description(&self) -> &str {
        "Record a plan for the task. It stays visible for the rest of the conversation."
    }

    async fn run(&self, input: &CommandInput, ctx: &ExecutionContext) -> Result<String, CommandError> {
        let plan = input.require_str("plan")?;
        if plan.trim().is_empty() {
            return Err(CommandError::InvalidInput("plan must not be empty".into()));
        }
        if !ctx.emit(ContextEvent::PlanCreated(plan.to_string())) {
            return Err(CommandError::Failed(
                "planning is not available in this run".into(),
            ));
        }
        Ok("[OK] Plan created".into())
    }
}
