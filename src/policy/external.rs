//! Policies implemented by an external program.

use super::{Policy, PolicyRequest, PolicyVerdict};
use crate::commands::plugin::{manifest_stem, resolve_args, split_program};
use crate::commands::process::run_process;
use crate::commands::ExecutionContext;
use crate::error::{ConfigError, PolicyError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_POLICY_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyManifest {
    kind: String,
    #[serde(default)]
    description: String,
    program: String,
    #[serde(default)]
    args: Vec<String>,
    timeout_secs: Option<u64>,
}

/// Program invocation shared by every binding of one plugin kind.
#[derive(Debug, Clone)]
pub struct PolicyProgram {
    pub kind: String,
    pub description: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl PolicyProgram {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let plugin_error = |message: String| ConfigError::Plugin {
            path: path.display().to_string(),
            message,
        };
        let text = fs::read_to_string(path)?;
        let manifest: PolicyManifest =
            toml::from_str(&text).map_err(|e| plugin_error(e.to_string()))?;
        let stem = manifest_stem(path);
        if manifest.kind != stem {
            return Err(plugin_error(format!(
                "kind `{}` must match the file name `{stem}`",
                manifest.kind
            )));
        }
        let (program, mut args) = split_program(path, &manifest.program)?;
        args.extend(resolve_args(path, &manifest.args));
        Ok(Self {
            kind: manifest.kind,
            description: manifest.description,
            program,
            args,
            timeout: Duration::from_secs(
                manifest.timeout_secs.unwrap_or(DEFAULT_POLICY_TIMEOUT_SECS),
            ),
        })
    }
}

/// One configured binding of a [`PolicyProgram`].
#[derive(Debug)]
pub struct ExternalPolicy {
    program: PolicyProgram,
    config: Value,
}

impl ExternalPolicy {
    pub fn new(program: PolicyProgram, config: &toml::Table) -> Result<Self, ConfigError> {
        let config = serde_json::to_value(config)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", program.kind)))?;
        Ok(Self { program, config })
    }

    fn unavailable(&self, message: String) -> PolicyError {
        PolicyError::Unavailable {
            policy: self.program.kind.clone(),
            message,
        }
    }
}

#[async_trait]
impl Policy for ExternalPolicy {
    fn name(&self) -> &str {
        &self.program.kind
    }

    async fn check(
        &self,
        request: &PolicyRequest<'_>,
        _ctx: &ExecutionContext,
    ) -> Result<PolicyVerdict, PolicyError> {
        let payload = json!({
            "command": request.command,
            "handler": request.handler,
            "input": request.input.to_json(),
            "config": self.config,
        })
        .to_string();
        let output = run_process(
            &self.program.program,
            &self.program.args,
            Some(payload.as_bytes()),
            None,
            self.program.timeout,
        )
        .await
        .map_err(|e| self.unavailable(e))?;
        if !output.success() {
            return Err(self.unavailable(format!(
                "exited with {}: {}",
                output.exit_code,
                output.failure_detail()
            )));
        }
        let reply: Value = serde_json::from_str(output.stdout.trim())
            .map_err(|e| self.unavailable(format!("reply is not JSON: {e}")))?;
        PolicyVerdict::from_reply(&self.program.kind, &reply)
    }
}
