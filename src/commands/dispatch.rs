//! Total dispatch of model function calls.
//!
//! Whatever the model sends, [`Dispatcher::dispatch`] answers with text: the
//! handler's output on success or an `[ERROR]`/`[DENIED]` line the model can
//! read. Only a broken policy escapes as an error.

use super::{CommandRegistry, ExecutionContext};
use crate::error::{DispatchError, PolicyError};
use crate::policy::{evaluate, GateDecision, PolicyRequest};
use serde_json::Value;
use tracing::{info, warn};

/// Validates, gates and runs calls against a fixed registry.
#[derive(Debug)]
pub struct Dispatcher {
    registry: CommandRegistry,
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Run `name` with raw JSON arguments and return the result text.
    pub async fn dispatch(
        &self,
        name: &str,
        raw_args: &str,
        ctx: &ExecutionContext,
    ) -> Result<String, PolicyError> {
        let outcome = self.try_dispatch(name, raw_args, ctx).await?;
        let handler = self
            .registry
            .get(name)
            .map(|d| d.handler.name().to_string())
            .unwrap_or_default();
        match outcome {
            Ok(output) => {
                info!(command = name, handler = %handler, outcome = "ok", "dispatch");
                Ok(output)
            }
            Err(err) => {
                warn!(command = name, handler = %handler, outcome = err.kind(), detail = %err, "dispatch");
                Ok(err.feedback())
            }
        }
    }

    /// Accept the single-key envelope form `{"<command>": {...}}`.
    pub async fn dispatch_envelope(
        &self,
        raw_json: &str,
        ctx: &ExecutionContext,
    ) -> Result<String, PolicyError> {
        let value: Value = match serde_json::from_str(raw_json) {
            Ok(value) => value,
            Err(e) => return Ok(format!("[ERROR] Invalid JSON: {e}")),
        };
        let single = value
            .as_object()
            .filter(|object| object.len() == 1)
            .and_then(|object| object.iter().next());
        match single {
            Some((name, args)) => self.dispatch(name, &args.to_string(), ctx).await,
            None => Ok(
                "[ERROR] Command must be a JSON object with exactly one top-level command key."
                    .to_string(),
            ),
        }
    }

    async fn try_dispatch(
        &self,
        name: &str,
        raw_args: &str,
        ctx: &ExecutionContext,
    ) -> Result<Result<String, DispatchError>, PolicyError> {
        let input = match self.registry.validate(name, raw_args) {
            Ok(input) => input,
            Err(err) => return Ok(Err(err)),
        };
        let Some(descriptor) = self.registry.get(name) else {
            return Ok(Err(DispatchError::UnknownCommand(name.to_string())));
        };

        let request = PolicyRequest {
            command: name,
            handler: descriptor.handler.name(),
            input: &input,
        };
        if let GateDecision::Denied { policy, reason } =
            evaluate(&descriptor.policies, &request, ctx).await?
        {
            return Ok(Err(DispatchError::PolicyDenied { policy, reason }));
        }

        let handler = descriptor.handler.clone();
        let task_ctx = ctx.clone();
        let joined =
            tokio::spawn(async move { handler.run(&input, &task_ctx).await }).await;
        Ok(match joined {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(DispatchError::HandlerFailure(err.to_string())),
            Err(join_err) => Err(DispatchError::HandlerFailure(panic_message(join_err))),
        })
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("handler panicked: {text}")
    } else {
        "handler panicked".to_string()
    }
}
