//! Python tooling: `run_python`, `run_pytest`, `pip_install`.

use crate::commands::process::{python_program, run_process, ExecOutput};
use crate::commands::schema::{CommandInput, FieldKind, InputSchema};
use crate::commands::{CommandDescriptor, CommandHandler, ExecutionContext};
use crate::error::CommandError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const PYTHON_TIMEOUT: Duration = Duration::from_secs(300);

/// Split an optional shell-style argument string.
fn extra_args(input: &CommandInput) -> Result<Vec<String>, CommandError> {
    match input.str("args") {
        None => Ok(Vec::new()),
        Some(raw) => shell_words::split(raw)
            .map_err(|e| CommandError::InvalidInput(format!("cannot parse args: {e}"))),
    }
}

async fn run_python_with(args: Vec<String>) -> Result<ExecOutput, CommandError> {
    run_process(&python_program(), &args, None, None, PYTHON_TIMEOUT)
        .await
        .map_err(CommandError::Failed)
}

// ---------------------------------------------------------------------------
// run_python
// ---------------------------------------------------------------------------

pub struct RunPython;

impl RunPython {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "run_python",
            InputSchema::new()
                .required("filepath", FieldKind::String, "The Python script to run.")
                .optional("args", FieldKind::String, "Command-line arguments, shell-quoted."),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl CommandHandler for RunPython {
    fn name(&self) -> &str {
        "run_python"
    }

    fn description(&self) -> &str {
        "Run a Python script and return its output and exit code."
    }

    async fn run(&self, input: &CommandInput, _ctx: &ExecutionContext) -> Result<String, CommandError> {
        let filepath = input.require_str("filepath")?;
        if !Path::new(filepath).is_file() {
            return Ok(format!("[ERROR] File not found: {filepath}"));
        }
        let mut args = vec![filepath.to_string()];
        args.extend(extra_args(input)?);
        let output = run_python_with(args).await?;
        let text = output.combined();
        Ok(if output.success() {
            if text.trim().is_empty() {
                "[OK] Script finished with no output.".to_string()
            } else {
                text
            }
        } else {
            format!("[ERROR] Script exited with code {}:\n{text}", output.exit_code)
        })
    }
}

// ---------------------------------------------------------------------------
// run_pytest
// ---------------------------------------------------------------------------

pub struct RunPytest;

impl RunPytest {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "run_pytest",
            InputSchema::new()
                .required(
                    "target",
                    FieldKind::String,
                    "Test file, directory or node id (path::test_name).",
                )
                .optional("args", FieldKind::String, "Extra pytest arguments, e.g. '-k name'."),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl CommandHandler for RunPytest {
    fn name(&self) -> &str {
        "run_pytest"
    }

    fn description(&self) -> &str {
        "Run pytest on a file or directory and return the test report."
    }

    async fn run(&self, input: &CommandInput, _ctx: &ExecutionContext) -> Result<String, CommandError> {
        let target = input.require_str("target")?;
        let path = target.split("::").next().unwrap_or(target);
        if !Path::new(path).exists() {
            return Ok(format!("[ERROR] Test target not found: {target}"));
        }
        let mut args = vec!["-m".to_string(), "pytest".to_string(), target.to_string()];
        args.extend(extra_args(input)?);
        let output = run_python_with(args).await?;
        let text = output.combined();
        Ok(if output.success() {
            text
        } else {
            format!("[ERROR] pytest exited with code {}:\n{text}", output.exit_code)
        })
    }
}

// ---------------------------------------------------------------------------
// pip_install
// ---------------------------------------------------------------------------

pub struct PipInstall;

impl PipInstall {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            "pip_install",
            InputSchema::new()
                .required("package_name", FieldKind::String, "Package to install.")
                .optional("version", FieldKind::String, "Exact version to pin, e.g. '1.19.2'."),
            Arc::new(Self),
        )
    }
}

fn pip_args(package: &str, version: Option<&str>) -> Vec<String> {
    let spec = match version {
        Some(version) => format!("{package}=={version}"),
        None => package.to_string(),
    };
    vec!["-m".into(), "pip".into(), "install".into(), spec]
}

#[async_trait]
impl CommandHandler for PipInstall {
    fn name(&self) -> &str {
        "pip_install"
    }

    fn description(&self) -> &str {
        "Install a Python package with pip."
    }

    async fn run(&self, input: &CommandInput, _ctx: &ExecutionContext) -> Result<String, CommandError> {
        let package = input.require_str("package_name")?;
        if package.trim().is_empty() || package.starts_with('-') {
            return Err(CommandError::InvalidInput(format!(
                "not a package name: {package:?}"
            )));
        }
        let output = run_python_with(pip_args(package, input.str("version"))).await?;
        Ok(if output.success() {
            format!("[OK] Installed {package}\n{}", output.stdout.trim_end())
        } else {
            format!(
                "Failed to install {package}. Error: {}",
                output.failure_detail()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use crate::testsupport::TestTempDir;
    use serde_json::{json, Value};

    async fn run(descriptor: CommandDescriptor, args: Value) -> Result<String, CommandError> {
        let input = descriptor.schema.validate(&args).unwrap();
        descriptor.handler.run(&input, &context()).await
    }

    fn python_available() -> bool {
        std::process::Command::new(python_program())
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn pip_args_pin_versions() {
        assert_eq!(pip_args("numpy", None), vec!["-m", "pip", "install", "numpy"]);
        assert_eq!(
            pip_args("numpy", Some("1.19.2")),
            vec!["-m", "pip", "install", "numpy==1.19.2"]
        );
    }

    #[tokio::test]
    async fn missing_targets_are_reported() {
        assert_eq!(
            run(RunPython::descriptor(), json!({"filepath": "nonexistent_script.py"}))
                .await
                .unwrap(),
            "[ERROR] File not found: nonexistent_script.py"
        );
        assert_eq!(
            run(RunPytest::descriptor(), json!({"target": "nonexistent_test.py::test_x"}))
                .await
                .unwrap(),
            "[ERROR] Test target not found: nonexistent_test.py::test_x"
        );
    }

    #[tokio::test]
    async fn option_like_package_names_are_rejected() {
        let err = run(PipInstall::descriptor(), json!({"package_name": "--upgrade"}))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::InvalidInput(_)));
    }

    // Verifies shell-quoted args reach the script intact.
    #[tokio::test]
    async fn run_python_passes_arguments() {
        if !python_available() {
            return;
        }
        let dir = TestTempDir::new("python");
        let path = dir.write_text("args.py", "import sys\nprint('ARGS:', sys.argv[1:])\n");
        let out = run(
            RunPython::descriptor(),
            json!({"filepath": path.to_string_lossy(), "args": "--test 'two words'"}),
        )
        .await
        .unwrap();
        assert!(out.contains("ARGS: ['--test', 'two words']"), "{out}");
    }

    #[tokio::test]
    async fn run_python_reports_failures() {
        if !python_available() {
            return;
        }
        let dir = TestTempDir::new("python");
        let path = dir.write_text("fail.py", "raise SystemExit('Something went wrong')\n");
        let out = run(RunPython::descriptor(), json!({"filepath": path.to_string_lossy()}))
            .await
            .unwrap();
        assert!(out.starts_with("[ERROR] Script exited with code 1:"), "{out}");
        assert!(out.contains("Something went wrong"), "{out}");
    }
}
