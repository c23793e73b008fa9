//! Directory commands: `list_files` and `search_files`.

use crate::commands::schema::{CommandInput, FieldKind, InputSchema};
use crate::commands::{CommandDescriptor, CommandHandler, ExecutionContext};
use crate::error::CommandError;
use async_trait::async_trait;
use glob::Pattern;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

/// Upper bound on reported search hits.
const MAX_SEARCH_MATCHES: usize = 200;

fn entry_name(entry: &walkdir::DirEntry) -> String {
    entry.file_name().to_string_lossy().into_owned()
}

// ---------------------------------------------------------------------------
// list_files
// ---------------------------------------------------------------------------

pub struct ListFiles;

impl ListFiles {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "list_files",
            InputSchema::new()
                .optional("directory", FieldKind::String, "Directory to list. Defaults to the current directory.")
                .optional("max_depth", FieldKind::Integer, "How many levels deep to list. Defaults to 1.")
                .optional(
                    "pattern",
                    FieldKind::String,
                    "Only list files whose name contains this text or matches this glob.",
                ),
            Arc::new(Self),
        )
    }
}

/// Name filter: a glob when the pattern has glob syntax, else a substring.
enum NameFilter {
    Glob(Pattern),
    Contains(String),
}

impl NameFilter {
    fn parse(raw: &str) -> Result<Self, String> {
        if raw.contains(['*', '?', '[']) {
            Pattern::new(raw)
                .map(Self::Glob)
                .map_err(|e| format!("invalid pattern `{raw}`: {e}"))
        } else {
            Ok(Self::Contains(raw.to_string()))
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Glob(pattern) => pattern.matches(name),
            Self::Contains(text) => name.contains(text.as_str()),
        }
    }
}

fn render_tree(root: &Path, max_depth: usize, filter: Option<&NameFilter>) -> Vec<String> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let indent = "  ".repeat(entry.depth() - 1);
            let name = entry_name(&entry);
            if entry.file_type().is_dir() {
                Some(format!("{indent}{name}/"))
            } else if filter.map_or(true, |f| f.matches(&name)) {
                Some(format!("{indent}{name}"))
            } else {
                None
            }
        })
        .collect()
}

#[async_trait]
impl CommandHandler for ListFiles {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories as an indented tree. Directories end with '/'."
    }

    async fn run(&self, input: &CommandInput, _ctx: &ExecutionContext) -> Result<String, CommandError> {
        let directory = input.str("directory").unwrap_or(".").to_string();
        let max_depth = input.int("max_depth").unwrap_or(1);
        if max_depth < 1 {
            return Ok("[ERROR] max_depth must be >= 1".into());
        }
        let root = Path::new(&directory);
        if !root.is_dir() {
            return Ok(format!("[ERROR] Directory not found: {directory}"));
        }
        let filter = match input.str("pattern").map(NameFilter::parse).transpose() {
            Ok(filter) => filter,
            Err(message) => return Ok(format!("[ERROR] {message}")),
        };
        let depth = usize::try_from(max_depth).unwrap_or(usize::MAX);
        let root = root.to_path_buf();
        let lines = tokio::task::spawn_blocking(move || render_tree(&root, depth, filter.as_ref()))
            .await
            .map_err(|e| CommandError::Failed(e.to_string()))?;
        if lines.is_empty() {
            return Ok(format!("[INFO] No files found in {directory}"));
        }
        Ok(lines.join("\n"))
    }
}

// ---------------------------------------------------------------------------
// search_files
// ---------------------------------------------------------------------------

pub struct SearchFiles;

impl SearchFiles {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "search_files",
            InputSchema::new()
                .required("directory", FieldKind::String, "Directory to search recursively.")
                .required("search", FieldKind::String, "Text to look for (case-insensitive).")
                .optional("extension", FieldKind::String, "Only search files with this extension, e.g. '.py'."),
            Arc::new(Self),
        )
    }
}

fn search_tree(root: &Path, needle: &str, extension: Option<&str>) -> Result<Vec<String>, String> {
    let needle = needle.to_lowercase();
    let mut hits = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry_name(&entry);
        if extension.is_some_and(|ext| !name.ends_with(ext)) {
            continue;
        }
        let path = entry.path();
        let bytes = std::fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
        // Binary files are skipped.
        let Ok(text) = String::from_utf8(bytes) else {
            continue;
        };
        let shown = path.strip_prefix(root).unwrap_or(path).display().to_string();
        for (index, line) in text.lines().enumerate() {
            if line.to_lowercase().contains(&needle) {
                hits.push(format!("{shown}:{}: {}", index + 1, line.trim()));
                if hits.len() == MAX_SEARCH_MATCHES {
                    hits.push(format!("[INFO] Stopped after {MAX_SEARCH_MATCHES} matches."));
                    return Ok(hits);
                }
            }
        }
    }
    Ok(hits)
}

#[async_trait]
impl CommandHandler for SearchFiles {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search files under a directory for a text, reporting path:line: text for each hit."
    }

    async fn run(&self, input: &CommandInput, _ctx: &ExecutionContext) -> Result<String, CommandError> {
        let directory = input.require_str("directory")?.to_string();
        let search = input.require_str("search")?.to_string();
        let extension = input.str("extension").map(str::to_string);
        let root = Path::new(&directory).to_path_buf();
        if !root.is_dir() {
            return Ok(format!("[ERROR] Directory not found: {directory}"));
        }
        let result =
            tokio::task::spawn_blocking(move || search_tree(&root, &search, extension.as_deref()))
                .await
                .map_err(|e| CommandError::Failed(e.to_string()))?;
        Ok(match result {
            Ok(hits) if hits.is_empty() => "[INFO] No matches found.".to_string(),
            Ok(hits) => hits.join("\n"),
            Err(message) => format!("[ERROR] Could not read {message}"),
        })
    }
}
