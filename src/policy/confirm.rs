//! Ask the operator before running a command.

use super::{Policy, PolicyRequest, PolicyVerdict};
use crate::commands::ExecutionContext;
use crate::error::{ConfigError, PolicyError};
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

pub const KIND: &str = "require_user_confirmation";
const DEFAULT_MESSAGE: &str = "Proceed?";

/// Shows a prompt and returns one answer line, `None` on end of input.
pub type PromptFn = Arc<dyn Fn(&str) -> io::Result<Option<String>> + Send + Sync>;

/// Allows only on an explicit `y`/`yes` from the operator.
pub struct RequireUserConfirmation {
    message: String,
    prompt: PromptFn,
}

impl RequireUserConfirmation {
    pub fn new(message: impl Into<String>, prompt: PromptFn) -> Self {
        Self {
            message: message.into(),
            prompt,
        }
    }

    /// Build from a `[[policy]]` table, prompting on the terminal.
    pub fn from_table(table: &toml::Table) -> Result<Self, ConfigError> {
        let message = match table.get("message") {
            None => DEFAULT_MESSAGE.to_string(),
            Some(toml::Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(ConfigError::Invalid(format!(
                    "{KIND}: `message` must be a string"
                )))
            }
        };
        Ok(Self::new(message, Arc::new(stdin_prompt)))
    }
}

fn stdin_prompt(text: &str) -> io::Result<Option<String>> {
    let mut stderr = io::stderr();
    write!(stderr, "{text}")?;
    stderr.flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl Policy for RequireUserConfirmation {
    fn name(&self) -> &str {
        KIND
    }

    async fn check(
        &self,
        request: &PolicyRequest<'_>,
        _ctx: &ExecutionContext,
    ) -> Result<PolicyVerdict, PolicyError> {
        let text = format!(
            "\n{} `{}` with {} [y/N]: ",
            self.message,
            request.command,
            request.input.to_json()
        );
        let prompt = Arc::clone(&self.prompt);
        let answer = tokio::task::spawn_blocking(move || prompt(&text))
            .await
            .map_err(|e| PolicyError::Unavailable {
                policy: KIND.to_string(),
                message: e.to_string(),
            })?;
        Ok(match answer {
            Ok(Some(line)) if is_yes(&line) => PolicyVerdict::Allow,
            Ok(Some(_)) => PolicyVerdict::Deny("User denied the action.".into()),
            Ok(None) | Err(_) => {
                PolicyVerdict::Deny("No input available to confirm action.".into())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use crate::commands::CommandInput;
    use std::sync::Mutex as StdMutex;

    async fn answer(reply: Option<&'static str>) -> PolicyVerdict {
        let policy = RequireUserConfirmation::new(
            "Proceed?",
            Arc::new(move |_| Ok(reply.map(str::to_string))),
        );
        let input = CommandInput::default();
        let request = PolicyRequest {
            command: "delete_file",
            handler: "delete_file",
            input: &input,
        };
        policy.check(&request, &context()).await.unwrap()
    }

    #[tokio::test]
    async fn accepts_yes_case_insensitively() {
        for reply in ["y\n", "yes", " YES \n", "Y"] {
            assert_eq!(answer(Some(reply)).await, PolicyVerdict::Allow, "{reply}");
        }
    }

    #[tokio::test]
    async fn anything_else_denies() {
        for reply in ["n", "no", "abc", "", "YEAH"] {
            assert_eq!(
                answer(Some(reply)).await,
                PolicyVerdict::Deny("User denied the action.".into()),
                "{reply}"
            );
        }
    }

    #[tokio::test]
    async fn end_of_input_denies() {
        assert_eq!(
            answer(None).await,
            PolicyVerdict::Deny("No input available to confirm action.".into())
        );
    }

    // Verifies the prompt names the command and the configured message.
    #[tokio::test]
    async fn prompt_mentions_command() {
        let seen = Arc::new(StdMutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let policy = RequireUserConfirmation::new(
            "Really?",
            Arc::new(move |text| {
                *sink.lock().unwrap() = text.to_string();
                Ok(Some("y".into()))
            }),
        );
        let input = CommandInput::default();
        let request = PolicyRequest {
            command: "pip_install",
            handler: "pip_install",
            input: &input,
        };
        policy.check(&request, &context()).await.unwrap();
        let text = seen.lock().unwrap().clone();
        assert!(text.contains("Really? `pip_install` with {}"), "{text}");
    }

    #[test]
    fn from_table_reads_message() {
        let table: toml::Table = toml::from_str("message = 3").unwrap();
        assert!(RequireUserConfirmation::from_table(&table).is_err());
        let table = toml::Table::new();
        assert_eq!(
            RequireUserConfirmation::from_table(&table).unwrap().message,
            "Proceed?"
        );
    }
}
