//! File commands: `view_file`, `create_file`, `edit_file`, `delete_file`.

use crate::commands::schema::{CommandInput, FieldKind, InputSchema};
use crate::commands::{CommandDescriptor, CommandHandler, ExecutionContext};
use crate::error::CommandError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;

/// Split keeping line terminators, so joining reproduces the file.
fn split_lines_inclusive(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Clamp a 1-based line number to a 0-based index within `0..=total`.
fn clamp_index(line: i64, total: usize) -> usize {
    usize::try_from(line.max(0)).unwrap_or(usize::MAX).min(total)
}

// ---------------------------------------------------------------------------
// view_file
// ---------------------------------------------------------------------------

pub struct ViewFile;

impl ViewFile {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "view_file",
            InputSchema::new()
                .required("filepath", FieldKind::String, "The path to the file to be viewed.")
                .optional("from_line", FieldKind::Integer, "Optional 1-based starting line number.")
                .optional(
                    "to_line",
                    FieldKind::Integer,
                    "Optional 1-based ending line number (inclusive).",
                ),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl CommandHandler for ViewFile {
    fn name(&self) -> &str {
        "view_file"
    }

    fn description(&self) -> &str {
        "View the contents of a file, optionally between specific line numbers."
    }

    async fn run(&self, input: &CommandInput, _ctx: &ExecutionContext) -> Result<String, CommandError> {
        let filepath = input.require_str("filepath")?;
        if !Path::new(filepath).is_file() {
            return Ok(format!("[ERROR] File not found: {filepath}"));
        }
        let text = match fs::read_to_string(filepath).await {
            Ok(text) => text,
            Err(e) => return Ok(format!("[ERROR] Could not read file: {e}")),
        };
        let lines = split_lines_inclusive(&text);
        let total = lines.len();
        // A zero bound counts as not given.
        let start = clamp_index(
            input.int("from_line").filter(|n| *n != 0).map_or(0, |n| n - 1),
            total,
        );
        let end = clamp_index(
            input.int("to_line").filter(|n| *n != 0).unwrap_or(total as i64),
            total,
        );
        if end == 0 {
            return Ok("[INFO] The file is empty or the specified range contains no lines.".into());
        }
        if start >= end {
            return Ok("[INFO] No lines to display (start >= end).".into());
        }
        Ok(lines[start..end].concat())
    }
}

// ---------------------------------------------------------------------------
// create_file
// ---------------------------------------------------------------------------

pub struct CreateFile;

impl CreateFile {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "create_file",
            InputSchema::new().required(
                "filepath",
                FieldKind::String,
                "The path of the file to create. Parent directories are created as needed.",
            ),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl CommandHandler for CreateFile {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create an empty file."
    }

    async fn run(&self, input: &CommandInput, _ctx: &ExecutionContext) -> Result<String, CommandError> {
        let filepath = input.require_str("filepath")?;
        let path = Path::new(filepath);
        if path.exists() {
            return Ok(format!("[INFO] File already exists: {filepath}"));
        }
        let created = async {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await?;
            }
            fs::write(path, "").await
        };
        Ok(match created.await {
            Ok(()) => format!("[OK] Created file: {filepath}"),
            Err(e) => format!("[ERROR] Could not create file: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// edit_file
// ---------------------------------------------------------------------------

pub struct EditFile;

impl EditFile {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "edit_file",
            InputSchema::new()
                .required("filepath", FieldKind::String, "The path to the file to edit.")
                .required("new_text", FieldKind::String, "Text block to insert or replace.")
                .optional("from_line", FieldKind::Integer, "1-based start line (inclusive).")
                .optional(
                    "to_line",
                    FieldKind::Integer,
                    "1-based end line (exclusive). Equal to from_line for insertion.",
                ),
            Arc::new(Self),
        )
    }
}

/// Replace lines `[start, end)` of `text` with `new_text`.
///
/// A blank `new_text` deletes the range; every inserted line is terminated.
fn splice_lines(text: &str, start: usize, end: usize, new_text: &str) -> String {
    let mut lines: Vec<String> = split_lines_inclusive(text)
        .into_iter()
        .map(str::to_string)
        .collect();
    let replacement: Vec<String> = if new_text.trim().is_empty() {
        Vec::new()
    } else {
        new_text.lines().map(|line| format!("{line}\n")).collect()
    };
    lines.splice(start..end, replacement);
    lines.concat()
}

#[async_trait]
impl CommandHandler for EditFile {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace lines [from_line, to_line) of a file with new_text. Without a range the whole file is replaced; from_line == to_line inserts; empty new_text deletes."
    }

    async fn run(&self, input: &CommandInput, _ctx: &ExecutionContext) -> Result<String, CommandError> {
        let filepath = input.require_str("filepath")?;
        let new_text = input.require_str("new_text")?;
        if !Path::new(filepath).is_file() {
            return Ok(format!("[ERROR] File not found: {filepath}"));
        }
        let text = match fs::read_to_string(filepath).await {
            Ok(text) => text,
            Err(e) => return Ok(format!("[ERROR] Could not edit file: {e}")),
        };
        let total = split_lines_inclusive(&text).len();
        let (start, end) = match (input.int("from_line"), input.int("to_line")) {
            (None, None) => (0, total),
            (from, to) => (
                clamp_index(from.map_or(0, |n| n - 1), total),
                clamp_index(to.map_or(total as i64, |n| n - 1), total),
            ),
        };
        if start > end {
            return Ok("[ERROR] Invalid line range: from_line must be <= to_line".into());
        }
        let updated = splice_lines(&text, start, end, new_text);
        Ok(match fs::write(filepath, updated).await {
            Ok(()) => format!("[OK] Edited file: {filepath}"),
            Err(e) => format!("[ERROR] Could not edit file: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// delete_file
// ---------------------------------------------------------------------------

pub struct DeleteFile;

impl DeleteFile {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "delete_file",
            InputSchema::new().required("filepath", FieldKind::String, "The file to delete."),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl CommandHandler for DeleteFile {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file."
    }

    async fn run(&self, input: &CommandInput, _ctx: &ExecutionContext) -> Result<String, CommandError> {
        let filepath = input.require_str("filepath")?;
        if !Path::new(filepath).is_file() {
            return Ok(format!("[ERROR] File not found: {filepath}"));
        }
        Ok(match fs::remove_file(filepath).await {
            Ok(()) => format!("[OK] Deleted file: {filepath}"),
            Err(e) => format!("[ERROR] Could not delete file: {e}"),
        })
    }
}
