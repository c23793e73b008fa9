//! Policy kinds and their binding to commands.

use super::blacklist::{self, DenyIfFieldInBlacklist};
use super::confirm::{self, RequireUserConfirmation};
use super::external::{ExternalPolicy, PolicyProgram};
use super::Policy;
use crate::commands::plugin::manifest_files;
use crate::commands::CommandRegistry;
use crate::config::PolicyBinding;
use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds a policy instance from a `[[policy]]` `config` table.
pub type PolicyFactory =
    Arc<dyn Fn(&toml::Table) -> Result<Arc<dyn Policy>, ConfigError> + Send + Sync>;

/// Known policy kinds for one run.
pub struct PolicyCatalog {
    factories: BTreeMap<String, PolicyFactory>,
}

impl Default for PolicyCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PolicyCatalog {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Catalog with the built-in kinds.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.insert(
            blacklist::KIND,
            Arc::new(|table: &toml::Table| {
                Ok(Arc::new(DenyIfFieldInBlacklist::from_table(table)?) as Arc<dyn Policy>)
            }),
        );
        catalog.insert(
            confirm::KIND,
            Arc::new(|table: &toml::Table| {
                Ok(Arc::new(RequireUserConfirmation::from_table(table)?) as Arc<dyn Policy>)
            }),
        );
        catalog
    }

    /// Add a kind; returns `true` when it replaced an existing one.
    pub fn insert(&mut self, kind: &str, factory: PolicyFactory) -> bool {
        self.factories.insert(kind.to_string(), factory).is_some()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Register every policy plugin found in `dirs`.
    pub fn load_plugins(&mut self, dirs: &[String]) -> Result<usize, ConfigError> {
        let files = manifest_files(dirs)?;
        for path in &files {
            let program = PolicyProgram::load(path)?;
            let kind = program.kind.clone();
            debug!(kind = %kind, description = %program.description, "loaded policy plugin");
            let factory: PolicyFactory = Arc::new(move |table: &toml::Table| {
                Ok(Arc::new(ExternalPolicy::new(program.clone(), table)?) as Arc<dyn Policy>)
            });
            if self.insert(&kind, factory) {
                warn!(kind = %kind, path = %path.display(), "overriding built-in policy");
            }
        }
        Ok(files.len())
    }

    pub fn build(&self, binding: &PolicyBinding) -> Result<Arc<dyn Policy>, ConfigError> {
        let factory = self.factories.get(&binding.kind).ok_or_else(|| {
            ConfigError::Invalid(format!("unknown policy kind `{}`", binding.kind))
        })?;
        factory(&binding.config)
    }

    /// Instantiate each binding once and attach it, in order, to its commands.
    ///
    /// Bindings naming commands absent from `registry` are skipped with a
    /// debug log, since the enabled subset is chosen per run.
    pub fn attach(
        &self,
        bindings: &[PolicyBinding],
        registry: &mut CommandRegistry,
    ) -> Result<(), ConfigError> {
        for binding in bindings {
            let policy = self.build(binding)?;
            for command in &binding.commands {
                match registry.descriptor_mut(command) {
                    Some(descriptor) => {
                        descriptor.policies.push(Arc::clone(&policy));
                        info!(policy = %binding.kind, command = %command, "policy attached");
                    }
                    None => {
                        debug!(policy = %binding.kind, command = %command, "policy target not enabled");
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::builtin::register_builtins;
    use crate::testsupport::TestTempDir;

    fn binding(kind: &str, commands: &[&str], config: &str) -> PolicyBinding {
        PolicyBinding {
            kind: kind.into(),
            commands: commands.iter().map(|c| c.to_string()).collect(),
            config: toml::from_str(config).unwrap(),
        }
    }

    #[test]
    fn builtin_kinds_are_known() {
        let catalog = PolicyCatalog::builtin();
        let kinds: Vec<&str> = catalog.kinds().collect();
        assert_eq!(kinds, vec![blacklist::KIND, confirm::KIND]);
    }

    // Verifies bindings attach in config order and skip disabled commands.
    #[test]
    fn attach_binds_policies_in_order() {
        let mut registry = CommandRegistry::new();
        register_builtins(&mut registry);
        let bindings = vec![
            binding(
                blacklist::KIND,
                &["view_file", "not_enabled"],
                "fields = [\"filepath\"]\nblacklist = [\"*.secret\"]",
            ),
            binding(confirm::KIND, &["view_file", "delete_file"], ""),
        ];
        PolicyCatalog::builtin()
            .attach(&bindings, &mut registry)
            .unwrap();
        let names: Vec<&str> = registry
            .get("view_file")
            .unwrap()
            .policies
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(names, vec![blacklist::KIND, confirm::KIND]);
        assert_eq!(registry.get("delete_file").unwrap().policies.len(), 1);
        assert!(registry.get("list_files").unwrap().policies.is_empty());
    }

    #[test]
    fn unknown_kind_is_config_error() {
        let mut registry = CommandRegistry::new();
        let err = PolicyCatalog::builtin()
            .attach(&[binding("nope", &["view_file"], "")], &mut registry)
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid config: unknown policy kind `nope`");
    }

    #[test]
    fn plugins_can_override_builtins() {
        let dir = TestTempDir::new("catalog");
        dir.write_text(
            "policies/require_user_confirmation.toml",
            "kind = \"require_user_confirmation\"\nprogram = \"true\"\n",
        );
        dir.write_text("policies/audit.toml", "kind = \"audit\"\nprogram = \"true\"\n");
        let mut catalog = PolicyCatalog::builtin();
        let loaded = catalog.load_plugins(&[dir.child_str("policies")]).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(catalog.kinds().count(), 3);
        let policy = catalog
            .build(&binding("audit", &[], ""))
            .unwrap();
        assert_eq!(policy.name(), "audit");
    }
}
