//! Markdown transcript of a run.
//!
//! The file is truncated when the run starts and only appended to afterwards.
//! Each entry is a colored speaker label, the content, and a `---` rule.
//! JSON content is pretty-printed in a fenced block, and the text payload of
//! `edit_file` and `make_plan` calls gets a block of its own.

use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Label colors, cycled by speaker.
const COLORS: [&str; 3] = ["#000000", "#1f77b4", "#ff7f0e"];

/// Who an entry is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Instruction,
    Ai,
    FunctionCall,
    Output,
}

impl Speaker {
    pub fn label(self) -> &'static str {
        match self {
            Self::Instruction => "Instruction",
            Self::Ai => "AI",
            Self::FunctionCall => "Function Call",
            Self::Output => "Output",
        }
    }

    fn color(self) -> &'static str {
        let index = match self {
            Self::Instruction => 0,
            Self::Ai => 1,
            Self::Output => 2,
            Self::FunctionCall => 3,
        };
        COLORS[index % COLORS.len()]
    }
}

/// Append-only Markdown log. A disabled transcript ignores every write.
#[derive(Debug, Clone)]
pub struct Transcript {
    path: Option<PathBuf>,
    spoiler: bool,
}

impl Transcript {
    pub fn disabled() -> Self {
        Self {
            path: None,
            spoiler: false,
        }
    }

    /// Create or truncate the log at `path`.
    pub fn start(path: impl Into<PathBuf>, spoiler: bool) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, "")?;
        Ok(Self {
            path: Some(path),
            spoiler,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, speaker: Speaker, content: &str) -> io::Result<()> {
        self.append(|| format_entry(speaker, content, self.spoiler))
    }

    /// Log a function call the model asked for.
    pub fn record_call(&self, name: &str, arguments: &str) -> io::Result<()> {
        self.append(|| format_call(name, arguments))
    }

    fn append(&self, entry: impl FnOnce() -> String) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(entry().as_bytes())
    }
}

/// Pretty form of `text` when it is a JSON object or array.
fn pretty_json(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    if !(value.is_object() || value.is_array()) {
        return None;
    }
    serde_json::to_string_pretty(&value).ok()
}

fn code_block(text: &str, lang: &str) -> String {
    format!("```{lang}\n{}\n```", text.trim_end())
}

/// Block for the text a call writes, if it is one that carries a payload.
fn payload_block(name: &str, args: &Value) -> Option<String> {
    match name {
        "edit_file" => {
            let text = args.get("new_text")?.as_str()?;
            let lang = args
                .get("filepath")
                .and_then(Value::as_str)
                .and_then(|path| Path::new(path).extension())
                .and_then(|ext| ext.to_str())
                .unwrap_or("txt");
            Some(code_block(text, lang))
        }
        "make_plan" => Some(code_block(args.get("plan")?.as_str()?, "txt")),
        _ => None,
    }
}

fn format_call(name: &str, arguments: &str) -> String {
    let body = match pretty_json(arguments) {
        Some(pretty) => {
            let mut body = format!("Calling {name} with args:\n\n{}", code_block(&pretty, "json"));
            let payload = serde_json::from_str::<Value>(arguments)
                .ok()
                .and_then(|args| payload_block(name, &args));
            if let Some(block) = payload {
                body.push_str("\n\n");
                body.push_str(&block);
            }
            body
        }
        None => format!("Calling {name} with args: {}", arguments.trim()),
    };
    wrap(Speaker::FunctionCall, &body)
}

fn format_entry(speaker: Speaker, content: &str, spoiler: bool) -> String {
    let body = content.trim_end();
    let (body, lang) = match pretty_json(body) {
        Some(pretty) => (pretty, "json"),
        None => (body.to_string(), "txt"),
    };
    let body = match speaker {
        Speaker::Output if spoiler => format!(
            "<details>\n<summary>Output</summary>\n\n{}\n\n</details>",
            code_block(&body, lang)
        ),
        Speaker::Output => code_block(&body, lang),
        _ if lang == "json" => code_block(&body, lang),
        _ => body,
    };
    wrap(speaker, &body)
}

fn wrap(speaker: Speaker, body: &str) -> String {
    format!(
        "<span style=\"color:{}\">**{}:**</span>\n\n{body}\n\n---\n\n",
        speaker.color(),
        speaker.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestTempDir;

    #[test]
    fn entry_layout_and_color_cycle() {
        assert_eq!(
            format_entry(Speaker::Ai, "Thinking.\n", false),
            "<span style=\"color:#1f77b4\">**AI:**</span>\n\nThinking.\n\n---\n\n"
        );
        assert!(format_entry(Speaker::Instruction, "x", false).contains("color:#000000"));
        assert!(format_entry(Speaker::Output, "x", false).contains("color:#ff7f0e"));
        assert!(format_entry(Speaker::FunctionCall, "x", false).contains("color:#000000"));
    }

    // Verifies JSON bodies are pretty-printed and plain text is left alone.
    #[test]
    fn json_content_is_pretty_printed() {
        let out = format_entry(Speaker::Output, r#"{"files":["a.py"]}"#, false);
        assert!(
            out.contains("```json\n{\n  \"files\": [\n    \"a.py\"\n  ]\n}\n```"),
            "{out}"
        );
        let ai = format_entry(Speaker::Ai, "[1, 2]", false);
        assert!(ai.contains("```json\n[\n  1,\n  2\n]\n```"), "{ai}");
        assert!(format_entry(Speaker::Output, "42", false).contains("```txt\n42\n```"));
        assert!(format_entry(Speaker::Ai, "{not json}", false).contains("\n\n{not json}\n\n"));
    }

    #[test]
    fn edit_and_plan_calls_show_their_text() {
        let edit = format_call(
            "edit_file",
            r#"{"filepath":"src/greet.py","new_text":"def greet():\n    return 'hi'","from_line":1}"#,
        );
        assert!(edit.starts_with("<span style=\"color:#000000\">**Function Call:**</span>"), "{edit}");
        assert!(edit.contains("Calling edit_file with args:\n\n```json\n{\n  \"filepath\""), "{edit}");
        assert!(edit.contains("```py\ndef greet():\n    return 'hi'\n```"), "{edit}");

        let plan = format_call("make_plan", r#"{"plan":"1. read\n2. fix"}"#);
        assert!(plan.contains("```txt\n1. read\n2. fix\n```"), "{plan}");

        let view = format_call("view_file", r#"{"filepath":"a.py"}"#);
        assert_eq!(view.matches("```").count(), 2, "{view}");

        let broken = format_call("view_file", "{oops");
        assert!(broken.contains("Calling view_file with args: {oops"), "{broken}");
    }

    #[test]
    fn spoiler_folds_command_output_only() {
        let out = format_entry(Speaker::Output, "line", true);
        assert!(out.contains("<details>\n<summary>Output</summary>"), "{out}");
        assert!(!format_entry(Speaker::Ai, "line", true).contains("<details>"));
    }

    // Verifies a new run clears the previous transcript.
    #[test]
    fn start_truncates_and_record_appends() {
        let dir = TestTempDir::new("transcript");
        let path = dir.write_text("logs/run.md", "old run\n");
        let transcript = Transcript::start(&path, false).unwrap();
        transcript.record(Speaker::Instruction, "first").unwrap();
        transcript.record(Speaker::Ai, "second").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("old run"));
        assert!(text.find("first").unwrap() < text.find("second").unwrap());
    }

    #[test]
    fn disabled_transcript_writes_nothing() {
        let transcript = Transcript::disabled();
        assert!(transcript.path().is_none());
        transcript.record(Speaker::Ai, "ignored").unwrap();
    }
}
