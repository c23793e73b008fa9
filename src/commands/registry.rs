//! Name-keyed command registry.

use super::schema::CommandInput;
use super::CommandDescriptor;
use crate::error::{DispatchError, ValidationError};
use crate::types::FunctionDefinition;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Outcome of [`CommandRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    /// An existing entry with the same name was replaced.
    Replaced,
}

/// Commands available to the model for one run.
#[derive(Debug, Default, Clone)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandDescriptor>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or override a command.
    pub fn register(&mut self, descriptor: CommandDescriptor) -> Result<Registration, String> {
        if descriptor.handler.name().trim().is_empty() {
            return Err(format!(
                "command `{}` has a handler without a name",
                descriptor.name
            ));
        }
        let name = descriptor.name.clone();
        match self.commands.insert(name.clone(), descriptor) {
            Some(_) => {
                warn!(command = %name, "overriding registered command");
                Ok(Registration::Replaced)
            }
            None => {
                debug!(command = %name, "registered command");
                Ok(Registration::Added)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.values()
    }

    pub fn descriptor_mut(&mut self, name: &str) -> Option<&mut CommandDescriptor> {
        self.commands.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Parse and check raw arguments for `name`.
    ///
    /// A blank argument string is treated as `{}`.
    pub fn validate(&self, name: &str, raw_args: &str) -> Result<CommandInput, DispatchError> {
        let descriptor = self
            .get(name)
            .ok_or_else(|| DispatchError::UnknownCommand(name.to_string()))?;
        let invalid = |detail| DispatchError::InvalidArguments {
            command: name.to_string(),
            handler: descriptor.handler.name().to_string(),
            detail,
        };
        let raw = if raw_args.trim().is_empty() {
            "{}"
        } else {
            raw_args
        };
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| invalid(ValidationError::MalformedJson(e.to_string())))?;
        descriptor.schema.validate(&value).map_err(invalid)
    }

    /// Prompt text for one command.
    pub fn describe(&self, name: &str) -> Option<String> {
        self.get(name).map(|descriptor| {
            format!(
                "{}: {}\n{}",
                descriptor.name,
                descriptor.handler.description(),
                descriptor.schema.describe()
            )
        })
    }

    /// Prompt text for every command, in name order.
    pub fn describe_all(&self) -> String {
        self.names()
            .filter_map(|name| self.describe(name))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn function_definitions(&self) -> Vec<FunctionDefinition> {
        self.commands
            .values()
            .map(|descriptor| FunctionDefinition {
                name: descriptor.name.clone(),
                description: descriptor.handler.description().to_string(),
                parameters: descriptor.schema.parameters_json(),
            })
            .collect()
    }

    /// Keep only `names`; returns the requested names that were not found.
    pub fn retain(&mut self, names: &[String]) -> Vec<String> {
        let missing = names
            .iter()
            .filter(|name| !self.commands.contains_key(name.as_str()))
            .cloned()
            .collect();
        self.commands.retain(|name, _| names.contains(name));
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::schema::{FieldKind, InputSchema};
    use crate::commands::{CommandHandler, ExecutionContext};
    use crate::error::CommandError;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Named(&'static str);

    #[async_trait]
    impl CommandHandler for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test handler"
        }
        async fn run(
            &self,
            _input: &CommandInput,
            _ctx: &ExecutionContext,
        ) -> Result<String, CommandError> {
            Ok(String::new())
        }
    }

    fn descriptor(name: &str, handler: &'static str) -> CommandDescriptor {
        CommandDescriptor::new(
            name,
            InputSchema::new().required("filepath", FieldKind::String, "path"),
            Arc::new(Named(handler)),
        )
    }

    #[test]
    fn register_reports_override() {
        let mut registry = CommandRegistry::new();
        assert_eq!(
            registry.register(descriptor("view_file", "view_file")),
            Ok(Registration::Added)
        );
        assert_eq!(
            registry.register(descriptor("view_file", "custom_view")),
            Ok(Registration::Replaced)
        );
        assert_eq!(registry.get("view_file").unwrap().handler.name(), "custom_view");
    }

    #[test]
    fn register_rejects_unnamed_handler() {
        let mut registry = CommandRegistry::new();
        assert!(registry.register(descriptor("x", " ")).is_err());
        assert!(registry.is_empty());
    }

    // Verifies validation failures carry the handler name for feedback.
    #[test]
    fn validate_reports_handler_name() {
        let mut registry = CommandRegistry::new();
        registry.register(descriptor("view_file", "viewer")).unwrap();
        let err = registry.validate("view_file", "{}").unwrap_err();
        assert_eq!(
            err.feedback(),
            "[ERROR] Invalid command input [viewer]: filepath: field required"
        );
        let err = registry.validate("view_file", "{not json").unwrap_err();
        assert!(err
            .feedback()
            .starts_with("[ERROR] Invalid command input [viewer]: arguments are not valid JSON"));
    }

    #[test]
    fn validate_unknown_command() {
        let registry = CommandRegistry::new();
        assert_eq!(
            registry.validate("nope", "{}").unwrap_err().feedback(),
            "[ERROR] Unknown command: nope"
        );
    }

    #[test]
    fn retain_keeps_enabled_subset() {
        let mut registry = CommandRegistry::new();
        registry.register(descriptor("a", "a")).unwrap();
        registry.register(descriptor("b", "b")).unwrap();
        let missing = registry.retain(&["b".to_string(), "zzz".to_string()]);
        assert_eq!(missing, vec!["zzz".to_string()]);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn definitions_and_description_follow_schema() {
        let mut registry = CommandRegistry::new();
        registry.register(descriptor("a", "a")).unwrap();
        let defs = registry.function_definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].parameters["required"][0], "filepath");
        assert_eq!(
            registry.describe("a").unwrap(),
            "a: test handler\n  - filepath (string): path"
        );
    }
}
