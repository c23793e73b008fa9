//! System prompt rendering.
//!
//! The configured introduction carries `{{TASK}}` and, optionally,
//! `{{COMMANDS}}`. When the command placeholder is missing the command list
//! is appended after the introduction.

use std::collections::BTreeMap;

const COMMANDS_HEADER: &str = "Available commands:";

/// Inputs for one rendered system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemPromptParams<'a> {
    pub introduction: &'a str,
    pub task: &'a str,
    /// Pre-rendered command descriptions, one block per command.
    pub commands: &'a str,
}

pub fn render_system_prompt(params: SystemPromptParams<'_>) -> String {
    let commands = render_commands(params.commands);
    let mut vars = BTreeMap::<&str, &str>::new();
    vars.insert("TASK", params.task.trim());
    let mut rendered = render_template(params.introduction, &vars);
    if rendered.contains("{{COMMANDS}}") {
        rendered = rendered.replace("{{COMMANDS}}", &commands);
    } else {
        rendered = format!("{}\n\n{commands}", rendered.trim_end());
    }
    normalize_blank_lines(&rendered)
}

fn render_template(template: &str, vars: &BTreeMap<&str, &str>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{{{key}}}}}");
        rendered = rendered.replace(&placeholder, value);
    }
    rendered
}

fn render_commands(commands: &str) -> String {
    if commands.trim().is_empty() {
        return format!("{COMMANDS_HEADER}\n(none)");
    }
    format!("{COMMANDS_HEADER}\n\n{}", commands.trim_end())
}

/// Collapse runs of blank lines and trim trailing spaces.
fn normalize_blank_lines(text: &str) -> String {
    let mut out = String::new();
    let mut previous_blank = false;
    for line in text.lines() {
        let is_blank = line.trim().is_empty();
        if is_blank && previous_blank {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line.trim_end());
        previous_blank = is_blank;
    }
    out.trim().to_string()
}
