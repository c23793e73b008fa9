//! Commands shipped with codemate.

mod assist;
mod files;
mod listing;
mod outline;
mod python;

pub use assist::{MakePlan, SummarizeFile};
pub use files::{CreateFile, DeleteFile, EditFile, ViewFile};
pub use listing::{ListFiles, SearchFiles};
pub use outline::{GetCode, ListDefinitions};
pub use python::{PipInstall, RunPytest, RunPython};

use super::{CommandDescriptor, CommandRegistry};
use tracing::warn;

/// Descriptors for every built-in command, in registration order.
pub fn builtin_descriptors() -> Vec<CommandDescriptor> {
    vec![
        ViewFile::descriptor(),
        CreateFile::descriptor(),
        EditFile::descriptor(),
        DeleteFile::descriptor(),
        ListFiles::descriptor(),
        SearchFiles::descriptor(),
        ListDefinitions::descriptor(),
        GetCode::descriptor(),
        SummarizeFile::descriptor(),
        RunPython::descriptor(),
        RunPytest::descriptor(),
        PipInstall::descriptor(),
        MakePlan::descriptor(),
    ]
}

/// Register all built-ins into `registry`.
pub fn register_builtins(registry: &mut CommandRegistry) {
    for descriptor in builtin_descriptors() {
        let name = descriptor.name.clone();
        if let Err(message) = registry.register(descriptor) {
            warn!(command = %name, %message, "built-in command not registered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtins_register_under_their_handler_names() {
        let mut registry = CommandRegistry::new();
        register_builtins(&mut registry);
        assert_eq!(registry.len(), 13);
        for descriptor in registry.descriptors() {
            assert_eq!(descriptor.name, descriptor.handler.name());
            assert!(!descriptor.handler.description().is_empty());
        }
    }

    // Verifies every built-in exposes a strict JSON schema to the model.
    #[test]
    fn function_definitions_are_strict_objects() {
        let mut registry = CommandRegistry::new();
        register_builtins(&mut registry);
        for definition in registry.function_definitions() {
            assert_eq!(definition.parameters["type"], "object", "{}", definition.name);
            assert_eq!(definition.parameters["additionalProperties"], false);
        }
    }
}
