//! Commands the model can invoke.
//!
//! A command is a [`CommandHandler`] paired with an [`InputSchema`] and the
//! ordered policies that guard it. Descriptors live in a
//! [`CommandRegistry`]; the [`Dispatcher`] turns one raw function call into
//! result text.

pub mod builtin;
pub mod dispatch;
pub mod plugin;
pub(crate) mod process;
pub mod registry;
pub mod schema;

use crate::api::ModelClient;
use crate::config::Config;
use crate::error::CommandError;
use crate::policy::Policy;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use dispatch::Dispatcher;
pub use registry::CommandRegistry;
pub use schema::{CommandInput, FieldKind, InputSchema};

/// Executes one command against validated input.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handler name used in audit logs and validation feedback.
    fn name(&self) -> &str;

    /// One-line description shown to the model.
    fn description(&self) -> &str;

    async fn run(&self, input: &CommandInput, ctx: &ExecutionContext)
        -> Result<String, CommandError>;
}

/// Registry entry: schema, handler and the policies guarding it.
#[derive(Clone)]
pub struct CommandDescriptor {
    pub name: String,
    pub schema: InputSchema,
    pub handler: Arc<dyn CommandHandler>,
    pub policies: Vec<Arc<dyn Policy>>,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>, schema: InputSchema, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            name: name.into(),
            schema,
            handler,
            policies: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policies.push(policy);
        self
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policies: Vec<&str> = self.policies.iter().map(|p| p.name()).collect();
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("handler", &self.handler.name())
            .field("policies", &policies)
            .finish()
    }
}

/// Requests a handler sends back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEvent {
    /// A plan was created and should become part of the prompt.
    PlanCreated(String),
}

/// Shared, read-only bundle handed to every handler and policy.
#[derive(Clone)]
pub struct ExecutionContext {
    pub client: Arc<dyn ModelClient>,
    pub model: String,
    pub config: Arc<Config>,
    events: Option<mpsc::UnboundedSender<ContextEvent>>,
}

impl ExecutionContext {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>, config: Arc<Config>) -> Self {
        Self {
            client,
            model: model.into(),
            config,
            events: None,
        }
    }

    /// Attach the channel the orchestrator drains after each command.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ContextEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Send an event; returns `false` when nobody is listening.
    pub fn emit(&self, event: ContextEvent) -> bool {
        match &self.events {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::testsupport::ScriptedClient;
    use crate::types::ChatResponse;

    pub fn context() -> ExecutionContext {
        context_with(Vec::new())
    }

    pub fn context_with(responses: Vec<ChatResponse>) -> ExecutionContext {
        ExecutionContext::new(
            Arc::new(ScriptedClient::new(responses)),
            "test-model",
            Arc::new(Config::default()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_channel_reports_no_listener() {
        let ctx = test_support::context();
        assert!(!ctx.emit(ContextEvent::PlanCreated("p".into())));
    }

    #[test]
    fn emit_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = test_support::context().with_events(tx);
        assert!(ctx.emit(ContextEvent::PlanCreated("p".into())));
        assert_eq!(rx.try_recv().unwrap(), ContextEvent::PlanCreated("p".into()));
    }
}
