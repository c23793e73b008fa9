//! User command plugins: TOML manifests that wrap an external program.
//!
//! A manifest `<name>.toml` declares the command name, description, program
//! and `[[field]]` schema. At run time the program receives
//! `{"input": {...}, "context": {"model": "..."}}` on stdin and its stdout
//! becomes the command result.

use super::process::run_process;
use super::schema::{CommandInput, FieldKind, InputSchema};
use super::{CommandDescriptor, CommandHandler, CommandRegistry, ExecutionContext};
use crate::error::{CommandError, ConfigError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_PLUGIN_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandManifest {
    name: String,
    description: String,
    program: String,
    #[serde(default)]
    args: Vec<String>,
    timeout_secs: Option<u64>,
    #[serde(default, rename = "field")]
    fields: Vec<FieldManifest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldManifest {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: String,
}

/// `*.toml` files in `dirs`, sorted per directory. Missing dirs are skipped.
pub fn manifest_files(dirs: &[String]) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();
    for dir in dirs {
        let dir = Path::new(dir);
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "plugin directory not found, skipping");
            continue;
        }
        let mut found: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

/// File stem used as the required plugin name.
pub(crate) fn manifest_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Resolve `./`-relative arguments against the manifest's directory.
pub(crate) fn resolve_args(manifest_path: &Path, args: &[String]) -> Vec<String> {
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    args.iter()
        .map(|arg| match arg.strip_prefix("./") {
            Some(rest) => base.join(rest).to_string_lossy().into_owned(),
            None => arg.clone(),
        })
        .collect()
}

/// Split a `program` string that carries its own arguments.
pub(crate) fn split_program(path: &Path, program: &str) -> Result<(String, Vec<String>), ConfigError> {
    let plugin_error = |message: String| ConfigError::Plugin {
        path: path.display().to_string(),
        message,
    };
    let mut words = shell_words::split(program)
        .map_err(|e| plugin_error(format!("cannot parse program: {e}")))?;
    if words.is_empty() {
        return Err(plugin_error("program must not be empty".into()));
    }
    let program = words.remove(0);
    Ok((program, words))
}

/// Load one command manifest into a descriptor.
pub fn load_command_plugin(path: &Path) -> Result<CommandDescriptor, ConfigError> {
    let plugin_error = |message: String| ConfigError::Plugin {
        path: path.display().to_string(),
        message,
    };
    let text = fs::read_to_string(path)?;
    let manifest: CommandManifest =
        toml::from_str(&text).map_err(|e| plugin_error(e.to_string()))?;

    let stem = manifest_stem(path);
    if manifest.name != stem {
        return Err(plugin_error(format!(
            "name `{}` must match the file name `{stem}`",
            manifest.name
        )));
    }

    let mut schema = InputSchema::new();
    for field in &manifest.fields {
        let kind = FieldKind::parse(&field.kind).ok_or_else(|| {
            plugin_error(format!(
                "field `{}` has unknown type `{}`",
                field.name, field.kind
            ))
        })?;
        schema = schema.field(&field.name, kind, field.required, &field.description);
    }

    let (program, mut args) = split_program(path, &manifest.program)?;
    args.extend(resolve_args(path, &manifest.args));

    let handler = PluginCommand {
        name: manifest.name.clone(),
        description: manifest.description,
        program,
        args,
        timeout: Duration::from_secs(manifest.timeout_secs.unwrap_or(DEFAULT_PLUGIN_TIMEOUT_SECS)),
    };
    Ok(CommandDescriptor::new(manifest.name, schema, Arc::new(handler)))
}

/// Load every command manifest in `dirs` into `registry`.
///
/// Plugins may replace built-ins; the registry logs each override.
pub fn load_command_plugins(
    dirs: &[String],
    registry: &mut CommandRegistry,
) -> Result<Vec<String>, ConfigError> {
    let mut loaded = Vec::new();
    for path in manifest_files(dirs)? {
        let descriptor = load_command_plugin(&path)?;
        let name = descriptor.name.clone();
        registry
            .register(descriptor)
            .map_err(|message| ConfigError::Plugin {
                path: path.display().to_string(),
                message,
            })?;
        debug!(command = %name, path = %path.display(), "loaded command plugin");
        loaded.push(name);
    }
    Ok(loaded)
}

/// Handler that pipes validated input to an external program.
#[derive(Debug)]
pub struct PluginCommand {
    name: String,
    description: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

#[async_trait]
impl CommandHandler for PluginCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, input: &CommandInput, ctx: &ExecutionContext) -> Result<String, CommandError> {
        let payload = json!({
            "input": input.to_json(),
            "context": {"model": ctx.model},
        })
        .to_string();
        let output = run_process(
            &self.program,
            &self.args,
            Some(payload.as_bytes()),
            None,
            self.timeout,
        )
        .await
        .map_err(CommandError::Failed)?;
        if !output.success() {
            return Err(CommandError::Failed(format!(
                "{} exited with {}: {}",
                self.name,
                output.exit_code,
                output.failure_detail()
            )));
        }
        Ok(output.stdout)
    }
}
