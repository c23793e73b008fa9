//! Typed, strict input schemas for commands.
//!
//! A schema is declared once per command and serves three purposes: it
//! validates the model's raw arguments, it renders the human-readable field
//! list for the system prompt, and it renders the JSON Schema sent in the
//! `functions` list.

use crate::error::{FieldIssue, FieldProblem, ValidationError};
use serde_json::{json, Map, Value};

/// Semantic type of an input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    StringList,
}

impl FieldKind {
    /// Parse the type names accepted in plugin manifests.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" | "str" => Some(Self::String),
            "integer" | "int" => Some(Self::Integer),
            "boolean" | "bool" => Some(Self::Boolean),
            "string_list" | "list[str]" => Some(Self::StringList),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::StringList => "list of strings",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    fn json_schema(self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Integer => json!({"type": "integer"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::StringList => json!({"type": "array", "items": {"type": "string"}}),
        }
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: String,
}

/// Ordered, strict field set for one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.field(name, kind, true, description)
    }

    pub fn optional(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.field(name, kind, false, description)
    }

    pub fn field(mut self, name: &str, kind: FieldKind, required: bool, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required,
            description: description.to_string(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Check `raw` against the schema.
    ///
    /// Issues are reported in schema order, followed by unknown fields in
    /// the order they appear. A `null` value counts as absent.
    pub fn validate(&self, raw: &Value) -> Result<CommandInput, ValidationError> {
        let object = raw.as_object().ok_or(ValidationError::NotAnObject)?;
        let mut issues = Vec::new();
        let mut values = Map::new();

        for spec in &self.fields {
            match object.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        issues.push(FieldIssue {
                            field: spec.name.clone(),
                            problem: FieldProblem::Missing,
                        });
                    }
                }
                Some(value) if spec.kind.accepts(value) => {
                    values.insert(spec.name.clone(), value.clone());
                }
                Some(_) => issues.push(FieldIssue {
                    field: spec.name.clone(),
                    problem: FieldProblem::WrongType {
                        expected: spec.kind.label(),
                    },
                }),
            }
        }

        for key in object.keys() {
            if !self.fields.iter().any(|spec| &spec.name == key) {
                issues.push(FieldIssue {
                    field: key.clone(),
                    problem: FieldProblem::Unknown,
                });
            }
        }

        if issues.is_empty() {
            Ok(CommandInput { values })
        } else {
            Err(ValidationError::Fields(issues))
        }
    }

    /// One line per field: `- name (type, optional): description`.
    pub fn describe(&self) -> String {
        if self.fields.is_empty() {
            return "  (no arguments)".to_string();
        }
        self.fields
            .iter()
            .map(|spec| {
                let optional = if spec.required { "" } else { ", optional" };
                format!(
                    "  - {} ({}{optional}): {}",
                    spec.name,
                    spec.kind.label(),
                    spec.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// JSON Schema object for the `functions` list.
    pub fn parameters_json(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.fields {
            let mut schema = spec.kind.json_schema();
            if let Some(obj) = schema.as_object_mut() {
                obj.insert("description".into(), Value::String(spec.description.clone()));
            }
            properties.insert(spec.name.clone(), schema);
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// Validated arguments. Only schema fields are present, with checked types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandInput {
    values: Map<String, Value>,
}

impl CommandInput {
    pub fn str(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(Value::as_str)
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.values.get(field).and_then(Value::as_i64)
    }

    pub fn bool(&self, field: &str) -> Option<bool> {
        self.values.get(field).and_then(Value::as_bool)
    }

    pub fn strings(&self, field: &str) -> Option<Vec<&str>> {
        self.values
            .get(field)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
    }

    /// Raw JSON of one field, if present.
    pub fn field_value(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Required string field; the schema guarantees presence.
    pub(crate) fn require_str(&self, field: &str) -> Result<&str, crate::error::CommandError> {
        self.str(field).ok_or_else(|| {
            crate::error::CommandError::InvalidInput(format!("missing field `{field}`"))
        })
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_schema() -> InputSchema {
        InputSchema::new()
            .required("filepath", FieldKind::String, "File to view.")
            .optional("from_line", FieldKind::Integer, "First line.")
            .optional("to_line", FieldKind::Integer, "Last line.")
    }

    #[test]
    fn validate_accepts_required_and_optional() {
        let input = view_schema()
            .validate(&json!({"filepath": "a.py", "from_line": 3}))
            .unwrap();
        assert_eq!(input.str("filepath"), Some("a.py"));
        assert_eq!(input.int("from_line"), Some(3));
        assert_eq!(input.int("to_line"), None);
    }

    // Verifies every problem is reported at once, in a stable order.
    #[test]
    fn validate_collects_all_issues() {
        let err = view_schema()
            .validate(&json!({"from_line": "3", "extra": true}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "filepath: field required; from_line: expected integer; extra: unknown field"
        );
    }

    #[test]
    fn validate_rejects_non_objects() {
        assert_eq!(
            view_schema().validate(&json!(["a.py"])).unwrap_err(),
            ValidationError::NotAnObject
        );
    }

    #[test]
    fn null_counts_as_absent() {
        let input = view_schema()
            .validate(&json!({"filepath": "a", "to_line": null}))
            .unwrap();
        assert!(input.field_value("to_line").is_none());
    }

    #[test]
    fn string_list_requires_all_strings() {
        let schema = InputSchema::new().required("names", FieldKind::StringList, "n");
        assert!(schema.validate(&json!({"names": ["a", "b"]})).is_ok());
        assert!(schema.validate(&json!({"names": ["a", 1]})).is_err());
    }

    #[test]
    fn describe_marks_optional_fields() {
        let text = view_schema().describe();
        assert!(text.contains("  - filepath (string): File to view."));
        assert!(text.contains("  - to_line (integer, optional): Last line."));
    }

    #[test]
    fn parameters_json_lists_required_fields() {
        let schema = view_schema().parameters_json();
        assert_eq!(schema["required"], json!(["filepath"]));
        assert_eq!(schema["properties"]["from_line"]["type"], "integer");
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn kind_parse_accepts_manifest_names() {
        assert_eq!(FieldKind::parse("int"), Some(FieldKind::Integer));
        assert_eq!(FieldKind::parse("list[str]"), Some(FieldKind::StringList));
        assert_eq!(FieldKind::parse("float"), None);
    }
}
