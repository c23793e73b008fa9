//! Child-process helpers shared by the Python commands and plugin programs.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// Captured result of one finished child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout and stderr joined the way command results show them.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }

    /// Stderr if present, else stdout, else the exit code.
    pub fn failure_detail(&self) -> String {
        let detail = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        if detail.is_empty() {
            format!("exited with {}", self.exit_code)
        } else {
            detail.to_string()
        }
    }
}

/// Spawn `program`, optionally feed stdin, and wait up to `limit`.
///
/// The child is killed when the wait times out.
pub(crate) async fn run_process(
    program: &str,
    args: &[String],
    stdin: Option<&[u8]>,
    cwd: Option<&Path>,
    limit: Duration,
) -> Result<ExecOutput, String> {
    let mut cmd = Command::new(program);
    cmd.kill_on_drop(true);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| format!("{program}: {e}"))?;

    // Stdin is fed from its own task so a child that never reads it cannot
    // stall the wait, and one that exits early only closes the pipe.
    let writer = stdin.zip(child.stdin.take()).map(|(input, mut pipe)| {
        let input = input.to_vec();
        tokio::spawn(async move { pipe.write_all(&input).await })
    });

    let abort = writer.as_ref().map(|handle| handle.abort_handle());
    let finished = timeout(limit, async {
        let output = child.wait_with_output().await;
        let written = match writer {
            Some(handle) => Some(handle.await),
            None => None,
        };
        (output, written)
    })
    .await;
    let Ok((output, written)) = finished else {
        if let Some(abort) = abort {
            abort.abort();
        }
        return Err(format!("{program} timed out after {}s", limit.as_secs_f32()));
    };
    let output = output.map_err(|e| format!("{program}: {e}"))?;
    match written {
        Some(Ok(Err(e))) if e.kind() != ErrorKind::BrokenPipe => {
            return Err(format!("{program}: {e}"));
        }
        Some(Err(e)) => return Err(format!("{program}: {e}")),
        _ => {}
    }

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Python interpreter used by the Python commands.
pub(crate) fn python_program() -> String {
    std::env::var("CODEMATE_PYTHON").unwrap_or_else(|_| "python3".to_string())
}
