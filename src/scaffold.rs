//! Starter files for command, policy and client plugins.

use crate::error::ConfigError;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const COMMAND_MANIFEST: &str = include_str!("templates/command.toml.template");
const COMMAND_SCRIPT: &str = include_str!("templates/command.py.template");
const POLICY_MANIFEST: &str = include_str!("templates/policy.toml.template");
const POLICY_SCRIPT: &str = include_str!("templates/policy.py.template");
const CLIENT_PROFILE: &str = include_str!("templates/client.toml.template");

/// Kind of plugin to scaffold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Command,
    Policy,
    Client,
}

impl PluginKind {
    /// Directory used when none is given, matching the shipped config.
    pub fn default_dir(self) -> &'static str {
        match self {
            Self::Command => ".codemate/commands",
            Self::Policy => ".codemate/policies",
            Self::Client => ".codemate/clients",
        }
    }

    fn files(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Command => &[("toml", COMMAND_MANIFEST), ("py", COMMAND_SCRIPT)],
            Self::Policy => &[("toml", POLICY_MANIFEST), ("py", POLICY_SCRIPT)],
            Self::Client => &[("toml", CLIENT_PROFILE)],
        }
    }
}

/// Write the starter files for `name` into `dir` (or the default directory).
///
/// Fails without writing anything if any target file already exists.
pub fn scaffold(kind: PluginKind, name: &str, dir: Option<&Path>) -> Result<Vec<PathBuf>, ConfigError> {
    validate_name(name)?;
    let dir = dir.map_or_else(|| PathBuf::from(kind.default_dir()), Path::to_path_buf);
    let targets: Vec<(PathBuf, String)> = kind
        .files()
        .iter()
        .map(|(ext, template)| {
            (
                dir.join(format!("{name}.{ext}")),
                template.replace("{{NAME}}", name),
            )
        })
        .collect();
    if let Some((existing, _)) = targets.iter().find(|(path, _)| path.exists()) {
        return Err(ConfigError::Invalid(format!(
            "{} already exists",
            existing.display()
        )));
    }
    fs::create_dir_all(&dir)?;
    let mut written = Vec::new();
    for (path, content) in targets {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => file.write_all(content.as_bytes())?,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ConfigError::Invalid(format!("{} already exists", path.display())));
            }
            Err(e) => return Err(e.into()),
        }
        info!(path = %path.display(), "scaffolded plugin file");
        written.push(path);
    }
    Ok(written)
}

fn validate_name(name: &str) -> Result<(), ConfigError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "`{name}` is not a valid plugin name; use letters, digits, '_' or '-'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::plugin::load_command_plugin;
    use crate::config::ModelConfig;
    use crate::policy::external::PolicyProgram;
    use crate::testsupport::TestTempDir;

    // Verifies a scaffolded command manifest loads as a plugin.
    #[test]
    fn command_scaffold_loads() {
        let dir = TestTempDir::new("scaffold");
        let written = scaffold(PluginKind::Command, "shout", Some(dir.path())).unwrap();
        assert_eq!(written.len(), 2);
        let descriptor = load_command_plugin(&dir.child("shout.toml")).unwrap();
        assert_eq!(descriptor.name, "shout");
        let script = std::fs::read_to_string(dir.child("shout.py")).unwrap();
        assert!(script.contains("shout received"));
    }

    #[test]
    fn policy_scaffold_loads() {
        let dir = TestTempDir::new("scaffold");
        scaffold(PluginKind::Policy, "no_deletes", Some(dir.path())).unwrap();
        assert!(PolicyProgram::load(&dir.child("no_deletes.toml")).is_ok());
    }

    #[test]
    fn client_scaffold_parses_as_profile() {
        let dir = TestTempDir::new("scaffold");
        scaffold(PluginKind::Client, "local", Some(dir.path())).unwrap();
        let text = std::fs::read_to_string(dir.child("local.toml")).unwrap();
        let profile: ModelConfig = toml::from_str(&text).unwrap();
        assert_eq!(profile.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn existing_files_are_never_overwritten() {
        let dir = TestTempDir::new("scaffold");
        dir.write_text("shout.py", "keep me");
        let err = scaffold(PluginKind::Command, "shout", Some(dir.path())).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(!dir.child("shout.toml").exists());
        assert_eq!(std::fs::read_to_string(dir.child("shout.py")).unwrap(), "keep me");
    }

    #[test]
    fn names_are_validated() {
        let dir = TestTempDir::new("scaffold");
        assert!(scaffold(PluginKind::Client, "../escape", Some(dir.path())).is_err());
        assert!(scaffold(PluginKind::Client, "", Some(dir.path())).is_err());
    }
}
