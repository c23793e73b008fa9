//! Python source outline: `list_definitions` and `get_code`.
//!
//! Files are parsed with tree-sitter's Python grammar. Only module level
//! definitions and the methods directly inside a class are outlined; a tree
//! containing any error or missing node is reported as a syntax error.

use crate::commands::schema::{CommandInput, FieldKind, InputSchema};
use crate::commands::{CommandDescriptor, CommandHandler, ExecutionContext};
use crate::error::CommandError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tree_sitter::{Language, Node, Parser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefKind {
    Function,
    Class,
}

#[derive(Debug, Clone)]
struct Definition {
    kind: DefKind,
    name: String,
    signature: String,
    doc: Option<String>,
    /// Column of the first line, decorators included.
    indent: usize,
    /// First line, decorators included (0-based).
    start: usize,
    /// One past the last line.
    end: usize,
    children: Vec<Definition>,
}

fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

fn squash(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First error or missing node in document order.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find_map(first_error);
    found
}

fn parameter(node: Node<'_>, source: &str) -> String {
    let field = |name: &str| node.child_by_field_name(name).map(|n| squash(text(n, source)));
    match node.kind() {
        "default_parameter" => match (field("name"), field("value")) {
            (Some(name), Some(value)) => format!("{name} = {value}"),
            _ => squash(text(node, source)),
        },
        "typed_default_parameter" => match (field("name"), field("type"), field("value")) {
            (Some(name), Some(ty), Some(value)) => format!("{name}: {ty} = {value}"),
            _ => squash(text(node, source)),
        },
        _ => squash(text(node, source)),
    }
}

fn signature(node: Node<'_>, source: &str, name: &str) -> String {
    let params = node
        .child_by_field_name("parameters")
        .map(|list| {
            let mut cursor = list.walk();
            let parts: Vec<String> = list
                .named_children(&mut cursor)
                .filter(|p| p.kind() != "comment")
                .map(|p| parameter(p, source))
                .collect();
            parts.join(", ")
        })
        .unwrap_or_default();
    match node.child_by_field_name("return_type") {
        Some(ret) => format!("{name}({params}) -> {}", squash(text(ret, source))),
        None => format!("{name}({params})"),
    }
}

fn clean_doc(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let Some((first, rest)) = lines.split_first() else {
        return String::new();
    };
    let margin = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut out = vec![first.trim().to_string()];
    out.extend(
        rest.iter()
            .map(|l| l.get(margin..).unwrap_or("").trim_end().to_string()),
    );
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    while out.first().is_some_and(|l| l.is_empty()) {
        out.remove(0);
    }
    out.join("\n")
}

/// Docstring of a function or class: a string literal as the first body statement.
fn docstring(body: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = body.walk();
    let first = body.named_children(&mut cursor).find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let mut inner_cursor = first.walk();
    let mut parts = first.named_children(&mut inner_cursor);
    let literal = parts.next().filter(|n| n.kind() == "string")?;
    if parts.next().is_some() {
        return None;
    }
    let raw = text(literal, source);
    let unprefixed = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    if unprefixed.len() != raw.len() && raw[..raw.len() - unprefixed.len()].contains(['f', 'F', 'b', 'B']) {
        return None;
    }
    let inner = ["\"\"\"", "'''", "\"", "'"].iter().find_map(|quote| {
        unprefixed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
    })?;
    Some(clean_doc(inner))
}

fn definition(outer: Node<'_>, source: &str) -> Option<Definition> {
    let node = if outer.kind() == "decorated_definition" {
        outer.child_by_field_name("definition")?
    } else {
        outer
    };
    let kind = match node.kind() {
        "function_definition" => DefKind::Function,
        "class_definition" => DefKind::Class,
        _ => return None,
    };
    let name = text(node.child_by_field_name("name")?, source).to_string();
    let body = node.child_by_field_name("body");
    let doc = body.and_then(|b| docstring(b, source));
    let children = match (kind, body) {
        (DefKind::Class, Some(body)) => level(body, source),
        _ => Vec::new(),
    };
    let end = outer.end_position();
    Some(Definition {
        kind,
        signature: match kind {
            DefKind::Function => signature(node, source, &name),
            DefKind::Class => name.clone(),
        },
        name,
        doc,
        indent: outer.start_position().column,
        start: outer.start_position().row,
        end: if end.column == 0 { end.row } else { end.row + 1 },
        children,
    })
}

/// Definitions that are direct children of `parent`.
fn level(parent: Node<'_>, source: &str) -> Vec<Definition> {
    let mut cursor = parent.walk();
    let defs = parent
        .named_children(&mut cursor)
        .filter_map(|child| definition(child, source))
        .collect();
    defs
}

fn parse_outline(source: &str) -> Result<Vec<Definition>, String> {
    let language: Language = tree_sitter_python::LANGUAGE.into();
    let mut parser = Parser::new();
    parser.set_language(&language).map_err(|e| e.to_string())?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| "parser produced no tree".to_string())?;
    let root = tree.root_node();
    if let Some(bad) = first_error(root) {
        let at = bad.start_position();
        let what = if bad.is_missing() {
            format!("expected '{}'", bad.kind())
        } else {
            "invalid syntax".to_string()
        };
        return Err(format!("{what} (line {}, column {})", at.row + 1, at.column + 1));
    }
    Ok(level(root, source))
}

fn source_of(source: &str, def: &Definition) -> String {
    source
        .lines()
        .skip(def.start)
        .take(def.end - def.start)
        .map(|l| l.get(def.indent..).unwrap_or(l.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Shared file checks
// ---------------------------------------------------------------------------

/// Read a Python file or produce the user-facing error line.
async fn read_python(filepath: &str) -> Result<String, String> {
    let path = Path::new(filepath);
    if !path.is_file() {
        return Err(format!("[ERROR] File not found: {filepath}"));
    }
    if path.extension().map_or(true, |ext| ext != "py") {
        return Err(format!("[ERROR] Not a Python file: {filepath}"));
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("[ERROR] Failed to read or parse the file: {e}"))
}

fn syntax_error(message: &str) -> String {
    format!("[ERROR] Could not parse file due to syntax error: {message}")
}

// ---------------------------------------------------------------------------
// list_definitions
// ---------------------------------------------------------------------------

pub struct ListDefinitions;

impl ListDefinitions {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "list_definitions",
            InputSchema::new().required(
                "filepath",
                FieldKind::String,
                "Path to the Python file to analyze.",
            ),
            Arc::new(Self),
        )
    }
}

fn format_function(def: &Definition) -> String {
    match &def.doc {
        Some(doc) => format!("  - {}\n    \"\"\"{doc}\"\"\"", def.signature),
        None => format!("  - {}", def.signature),
    }
}

fn render_outline(defs: &[Definition]) -> Option<String> {
    let functions: Vec<String> = defs
        .iter()
        .filter(|d| d.kind == DefKind::Function)
        .map(format_function)
        .collect();
    let classes: Vec<String> = defs
        .iter()
        .filter(|d| d.kind == DefKind::Class)
        .map(|class| {
            let mut block = format!("- {}", class.name);
            if let Some(doc) = &class.doc {
                block.push_str(&format!("\n  \"\"\"{doc}\"\"\""));
            }
            for method in class.children.iter().filter(|d| d.kind == DefKind::Function) {
                block.push('\n');
                block.push_str(&format_function(method));
            }
            block
        })
        .collect();

    let mut out = Vec::new();
    if !functions.is_empty() {
        out.push(format!("[INFO] Found {} top-level function(s):", functions.len()));
        out.extend(functions);
    }
    if !classes.is_empty() {
        out.push(format!("\n[INFO] Found {} class(es):", classes.len()));
        out.extend(classes);
    }
    if out.is_empty() {
        None
    } else {
        Some(out.join("\n").trim_start().to_string())
    }
}

#[async_trait]
impl CommandHandler for ListDefinitions {
    fn name(&self) -> &str {
        "list_definitions"
    }

    fn description(&self) -> &str {
        "List the functions and classes in a Python file with signatures and docstrings."
    }

    async fn run(&self, input: &CommandInput, _ctx: &ExecutionContext) -> Result<String, CommandError> {
        let filepath = input.require_str("filepath")?;
        let source = match read_python(filepath).await {
            Ok(source) => source,
            Err(line) => return Ok(line),
        };
        Ok(match parse_outline(&source) {
            Ok(defs) => render_outline(&defs)
                .unwrap_or_else(|| format!("[INFO] No functions or classes found in {filepath}")),
            Err(message) => syntax_error(&message),
        })
    }
}

// ---------------------------------------------------------------------------
// get_code
// ---------------------------------------------------------------------------

pub struct GetCode;

impl GetCode {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "get_code",
            InputSchema::new()
                .required("filepath", FieldKind::String, "Path to the Python file.")
                .required(
                    "element",
                    FieldKind::String,
                    "'function', 'Class' or 'Class.method' to extract.",
                ),
            Arc::new(Self),
        )
    }
}

fn find_element(source: &str, defs: &[Definition], element: &str) -> String {
    let parts: Vec<&str> = element.split('.').collect();
    match parts.as_slice() {
        [name] => defs
            .iter()
            .find(|d| d.name == *name)
            .map(|d| source_of(source, d))
            .unwrap_or_else(|| format!("[INFO] Element '{element}' not found.")),
        [class, method] => {
            let Some(owner) = defs
                .iter()
                .find(|d| d.kind == DefKind::Class && d.name == *class)
            else {
                return format!("[INFO] Class '{class}' not found.");
            };
            owner
                .children
                .iter()
                .find(|d| d.kind == DefKind::Function && d.name == *method)
                .map(|d| source_of(source, d))
                .unwrap_or_else(|| format!("[INFO] Method '{element}' not found."))
        }
        _ => "[ERROR] Invalid element format. Use 'function', 'Class' or 'Class.method'.".into(),
    }
}

#[async_trait]
impl CommandHandler for GetCode {
    fn name(&self) -> &str {
        "get_code"
    }

    fn description(&self) -> &str {
        "Return the source of a function, class or method from a Python file."
    }

    async fn run(&self, input: &CommandInput, _ctx: &ExecutionContext) -> Result<String, CommandError> {
        let filepath = input.require_str("filepath")?;
        let element = input.require_str("element")?;
        let source = match read_python(filepath).await {
            Ok(source) => source,
            Err(line) => return Ok(line),
        };
        Ok(match parse_outline(&source) {
            Ok(defs) => find_element(&source, &defs, element),
            Err(message) => syntax_error(&message),
        })
    }
}
