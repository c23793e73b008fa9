//! Console rendering for a run.
//!
//! `RenderSink` is what the orchestrator talks to. `Renderer` is the
//! terminal implementation: everything goes to stderr so stdout stays free
//! for the final summary, and colors are dropped under `--no-color`.

use crate::textutil::preview;
use crossterm::style::{Color, Stylize};

const ARGS_PREVIEW_CHARS: usize = 100;
const RESULT_PREVIEW_CHARS: usize = 140;
const INDENT: &str = "  ";

/// Injectable output surface for the agent loop.
pub trait RenderSink: Send + Sync {
    /// Run banner with the model id.
    fn header(&self, model: &str);
    /// Non-blank reasoning text from the model.
    fn reasoning(&self, text: &str);
    fn command_call(&self, name: &str, args: &str);
    fn command_result(&self, name: &str, output: &str);
    fn token_usage(&self, prompt: u64, completion: u64, session_total: u64);
    /// Lifecycle notices such as plan updates or termination.
    fn notice(&self, text: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn header(&self, _model: &str) {}
    fn reasoning(&self, _text: &str) {}
    fn command_call(&self, _name: &str, _args: &str) {}
    fn command_result(&self, _name: &str, _output: &str) {}
    fn token_usage(&self, _prompt: u64, _completion: u64, _session_total: u64) {}
    fn notice(&self, _text: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}

/// Terminal renderer writing styled lines to stderr.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn label_line(&self, label: &str, tint: Color, text: &str) {
        if self.color {
            eprintln!("{} {text}", label.with(tint).bold());
        } else {
            eprintln!("{label} {text}");
        }
    }
}

/// Color for a command result line, keyed on its status prefix.
fn result_tint(output: &str) -> Color {
    if output.starts_with("[ERROR]") {
        Color::Red
    } else if output.starts_with("[DENIED]") {
        Color::Magenta
    } else if output.starts_with("[OK]") {
        Color::Green
    } else {
        Color::Grey
    }
}

impl RenderSink for Renderer {
    fn header(&self, model: &str) {
        if self.color {
            eprintln!("{} {}", "codemate".with(Color::Cyan).bold(), model.with(Color::DarkGrey));
        } else {
            eprintln!("codemate ({model})");
        }
    }

    fn reasoning(&self, text: &str) {
        self.label_line("AI:", Color::Blue, text.trim());
    }

    fn command_call(&self, name: &str, args: &str) {
        let args = preview(args, ARGS_PREVIEW_CHARS);
        if self.color {
            eprintln!(
                "{INDENT}{} {}({})",
                "->".with(Color::Yellow),
                name.with(Color::Yellow).bold(),
                args.with(Color::DarkGrey)
            );
        } else {
            eprintln!("{INDENT}-> {name}({args})");
        }
    }

    fn command_result(&self, _name: &str, output: &str) {
        let shown = preview(output, RESULT_PREVIEW_CHARS);
        if self.color {
            eprintln!("{INDENT}{} {}", "<-".with(Color::DarkGrey), shown.with(result_tint(output)));
        } else {
            eprintln!("{INDENT}<- {shown}");
        }
    }

    fn token_usage(&self, prompt: u64, completion: u64, session_total: u64) {
        let line = format!("prompt:{prompt} completion:{completion} session:{session_total}");
        if self.color {
            eprintln!("{INDENT}{} {}", "tokens".with(Color::DarkGrey), line.with(Color::DarkGrey));
        } else {
            eprintln!("{INDENT}tokens {line}");
        }
    }

    fn notice(&self, text: &str) {
        self.label_line("*", Color::Cyan, text);
    }

    fn warn(&self, msg: &str) {
        self.label_line("warning:", Color::Yellow, msg);
    }

    fn error(&self, msg: &str) {
        self.label_line("error:", Color::Red, msg);
    }
}
