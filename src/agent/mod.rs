//! The agent loop.
//!
//! [`Orchestrator`] owns one conversation. Each iteration sends the rendered
//! memory to the model, records the reply, and then either terminates, runs
//! the single requested command, or nudges the model with an empty user turn.
//! The choice between those is made by the pure [`decide`] function.
//!
//! ```text
//! Init -> Reasoning <-> Executing -> Terminated
//! ```

pub mod prompt;

use crate::api::ModelClient;
use crate::commands::builtin::register_builtins;
use crate::commands::plugin::load_command_plugins;
use crate::commands::{CommandRegistry, ContextEvent, Dispatcher, ExecutionContext};
use crate::config::{Config, DEFAULT_FIRST_MESSAGE};
use crate::error::{AgentError, ConfigError};
use crate::memory::{MemoryLimits, MemoryManager};
use crate::policy::PolicyCatalog;
use crate::tokens::TokenTracker;
use crate::transcript::{Speaker, Transcript};
use crate::types::{ChatRequest, FunctionCall, FunctionDefinition, ModelReply};
use crate::ui::render::{NullSink, RenderSink};
use prompt::{render_system_prompt, SystemPromptParams};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reasoning text that ends the run.
pub const END_TOKEN: &str = "END";
const PLAN_COMMAND: &str = "make_plan";

/// What the loop does after a model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Terminate,
    Execute(FunctionCall),
    Continue,
}

/// Pick the next step for `reply`.
///
/// The end signal wins over a function call in the same reply, so that call
/// is never run.
pub fn decide(reply: &ModelReply, end_token: &str) -> Transition {
    let ends = reply.reasoning.as_deref().is_some_and(|text| {
        let text = text.trim();
        text == end_token || text.ends_with(end_token)
    });
    if ends {
        return Transition::Terminate;
    }
    match &reply.function_call {
        Some(call) => Transition::Execute(call.clone()),
        None => Transition::Continue,
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model signalled completion.
    EndSignal,
    StepLimit,
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub reason: StopReason,
    /// Model turns taken.
    pub steps: usize,
    /// Last non-blank reasoning text, usually the model's closing summary.
    pub final_message: Option<String>,
    pub usage: TokenTracker,
    pub memory_file: PathBuf,
}

/// Build the command registry for `config`: built-ins, command plugins, the
/// enabled subset (plus `make_plan` when planning), then policies.
pub fn build_registry(config: &Config) -> Result<CommandRegistry, ConfigError> {
    let mut registry = CommandRegistry::new();
    register_builtins(&mut registry);
    let plugins = load_command_plugins(&config.custom_commands_paths, &mut registry)?;
    if !plugins.is_empty() {
        info!(count = plugins.len(), "command plugins loaded");
    }

    let mut enabled = config.commands.clone();
    if config.planning.active && !enabled.iter().any(|c| c == PLAN_COMMAND) {
        enabled.push(PLAN_COMMAND.to_string());
    }
    let missing = registry.retain(&enabled);
    if !missing.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "unknown commands enabled: {}",
            missing.join(", ")
        )));
    }

    let mut catalog = PolicyCatalog::builtin();
    catalog.load_plugins(&config.custom_policies_paths)?;
    catalog.attach(&config.policies, &mut registry)?;
    Ok(registry)
}

/// Drives one conversation from the first prompt to termination.
pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
    config: Arc<Config>,
    dispatcher: Dispatcher,
    functions: Vec<FunctionDefinition>,
    memory: MemoryManager,
    transcript: Transcript,
    sink: Arc<dyn RenderSink>,
    tracker: TokenTracker,
    ctx: ExecutionContext,
    events: mpsc::UnboundedReceiver<ContextEvent>,
    system_prompt: String,
    first_message: String,
}

impl Orchestrator {
    /// Set up a run. The transcript is cleared here when logging is active.
    pub fn new(
        config: Config,
        registry: CommandRegistry,
        client: Arc<dyn ModelClient>,
    ) -> Result<Self, AgentError> {
        let task = config.task.clone().ok_or_else(|| {
            ConfigError::Invalid("no task given; pass --task or set `task` in the config".into())
        })?;
        let system_prompt = render_system_prompt(SystemPromptParams {
            introduction: &config.introduction_prompt,
            task: &task,
            commands: &registry.describe_all(),
        });
        let first_message = if config.planning.active {
            config.planning.prompt.clone()
        } else {
            DEFAULT_FIRST_MESSAGE.to_string()
        };
        let transcript = if config.log.active {
            Transcript::start(&config.log.filepath, config.log.spoiler).map_err(ConfigError::Io)?
        } else {
            Transcript::disabled()
        };

        let model = config.api.model.clone();
        let memory = MemoryManager::new(
            system_prompt.clone(),
            model.clone(),
            MemoryLimits::from(config.memory),
        );
        let functions = registry.function_definitions();
        let config = Arc::new(config);
        let (tx, events) = mpsc::unbounded_channel();
        let ctx = ExecutionContext::new(Arc::clone(&client), model, Arc::clone(&config)).with_events(tx);

        debug!(commands = ?registry.names().collect::<Vec<_>>(), "orchestrator ready");
        Ok(Self {
            client,
            config,
            dispatcher: Dispatcher::new(registry),
            functions,
            memory,
            transcript,
            sink: Arc::new(NullSink),
            tracker: TokenTracker::default(),
            ctx,
            events,
            system_prompt,
            first_message,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn RenderSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn tracker(&self) -> &TokenTracker {
        &self.tracker
    }

    /// Run until the model ends the task or the step limit is reached.
    pub async fn run(&mut self) -> Result<RunOutcome, AgentError> {
        let model = self.ctx.model.clone();
        info!(model = %model, commands = self.functions.len(), "run started");
        self.sink.header(&model);
        self.log(Speaker::Instruction, &self.system_prompt);
        self.log(Speaker::Instruction, &self.first_message);
        self.memory.append_user(self.first_message.clone());

        let mut steps = 0usize;
        let mut final_message = None;
        loop {
            if let Some(limit) = self.config.steps_limit {
                if steps >= limit {
                    warn!(limit, "step limit reached");
                    self.sink
                        .notice(&format!("Step limit of {limit} reached, stopping."));
                    return self.finish(StopReason::StepLimit, steps, final_message);
                }
            }
            steps += 1;

            let reply = self.request_reply(&model).await?;
            if let Some(text) = reply.reasoning.as_deref().filter(|t| !t.trim().is_empty()) {
                info!(step = steps, reasoning = %text.trim(), "model reasoning");
                self.sink.reasoning(text);
                self.log(Speaker::Ai, text);
                final_message = Some(text.trim().to_string());
            }
            if let Some(call) = &reply.function_call {
                if let Err(e) = self.transcript.record_call(&call.name, &call.arguments) {
                    warn!(error = %e, "could not write transcript entry");
                }
            }

            self.memory
                .append_assistant(reply.reasoning.clone(), reply.function_call.clone());
            self.compact().await?;

            match decide(&reply, END_TOKEN) {
                Transition::Terminate => {
                    info!(step = steps, "end signal received");
                    return self.finish(StopReason::EndSignal, steps, final_message);
                }
                Transition::Execute(call) => {
                    self.sink.command_call(&call.name, &call.arguments);
                    let output = self
                        .dispatcher
                        .dispatch(&call.name, &call.arguments, &self.ctx)
                        .await?;
                    self.sink.command_result(&call.name, &output);
                    self.log(Speaker::Output, &output);
                    self.memory.append_function_result(call.name, output);
                }
                Transition::Continue => {
                    debug!(step = steps, "no command requested, continuing");
                    self.memory.append_user(String::new());
                }
            }
            self.apply_events();
            self.compact().await?;
        }
    }

    async fn request_reply(&mut self, model: &str) -> Result<ModelReply, AgentError> {
        let mut request = ChatRequest::new(model, self.memory.render());
        if !self.functions.is_empty() {
            request.functions = Some(self.functions.clone());
        }
        request.temperature = self.config.api.temperature;
        debug!(messages = request.messages.len(), "sending chat request");
        let response = self.client.chat(&request).await?;
        if let Some(usage) = response.usage {
            self.tracker
                .record(usage.prompt_tokens, usage.completion_tokens);
            self.sink.token_usage(
                usage.prompt_tokens,
                usage.completion_tokens,
                self.tracker.session_total(),
            );
        }
        Ok(response.into_reply()?)
    }

    async fn compact(&mut self) -> Result<(), AgentError> {
        if let Some(report) = self
            .memory
            .maybe_compact(self.client.as_ref())
            .await
            .map_err(AgentError::Summarization)?
        {
            debug!(?report, "memory compacted");
        }
        Ok(())
    }

    /// Apply state changes handlers asked for during the last command.
    fn apply_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                ContextEvent::PlanCreated(plan) => {
                    info!(chars = plan.len(), "plan recorded");
                    self.sink.notice("Plan recorded.");
                    self.memory.set_plan(plan);
                }
            }
        }
    }

    fn finish(
        &mut self,
        reason: StopReason,
        steps: usize,
        final_message: Option<String>,
    ) -> Result<RunOutcome, AgentError> {
        let memory_file = PathBuf::from(&self.config.memory_file);
        self.memory
            .persist(&memory_file)
            .map_err(AgentError::Persist)?;
        info!(
            ?reason,
            steps,
            tokens = self.tracker.session_total(),
            "run finished"
        );
        Ok(RunOutcome {
            reason,
            steps,
            final_message,
            usage: self.tracker.clone(),
            memory_file,
        })
    }

    fn log(&self, speaker: Speaker, content: &str) {
        if let Err(e) = self.transcript.record(speaker, content) {
            warn!(error = %e, "could not write transcript entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SUMMARY_PREFIX;
    use crate::testsupport::{call_response, reply, text_response, ScriptedClient, TestTempDir};
    use crate::types::Role;

    fn model_reply(reasoning: Option<&str>, call: Option<(&str, &str)>) -> ModelReply {
        ModelReply {
            reasoning: reasoning.map(str::to_string),
            function_call: call.map(|(name, arguments)| FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            }),
        }
    }

    fn test_config(dir: &TestTempDir) -> Config {
        let mut config = Config::default();
        config.task = Some("Create hello.txt".into());
        config.commands = vec!["view_file".into(), "create_file".into()];
        config.memory_file = dir.child_str("memory.json");
        config.log.filepath = dir.child_str("run.md");
        // No tiktoken encoding, so budgets below use the chars/4 estimate.
        config.api.model = "scripted-model".into();
        config
    }

    fn orchestrator(config: Config, client: Arc<ScriptedClient>) -> Orchestrator {
        let registry = build_registry(&config).unwrap();
        Orchestrator::new(config, registry, client).unwrap()
    }

    #[test]
    fn decide_covers_each_transition() {
        assert_eq!(decide(&model_reply(Some("END"), None), END_TOKEN), Transition::Terminate);
        assert_eq!(
            decide(&model_reply(Some("All done.\nEND\n"), None), END_TOKEN),
            Transition::Terminate
        );
        assert_eq!(
            decide(&model_reply(None, Some(("view_file", "{}"))), END_TOKEN),
            Transition::Execute(FunctionCall {
                name: "view_file".into(),
                arguments: "{}".into()
            })
        );
        assert_eq!(decide(&model_reply(Some("thinking"), None), END_TOKEN), Transition::Continue);
        assert_eq!(decide(&model_reply(None, None), END_TOKEN), Transition::Continue);
        assert_eq!(
            decide(&model_reply(Some("END is near, keep going"), None), END_TOKEN),
            Transition::Continue
        );
    }

    // Verifies an END reply carrying a call terminates without running it.
    #[test]
    fn end_signal_beats_function_call() {
        let reply = model_reply(Some("END"), Some(("delete_file", r#"{"filepath":"x"}"#)));
        assert_eq!(decide(&reply, END_TOKEN), Transition::Terminate);
    }

    #[tokio::test]
    async fn run_executes_command_then_terminates() {
        let dir = TestTempDir::new("agent");
        let target = dir.child_str("hello.txt");
        let args = serde_json::json!({ "filepath": target }).to_string();
        let client = Arc::new(ScriptedClient::new(vec![
            reply(Some("Creating the file."), Some(("create_file", args.as_str()))),
            text_response("Done. END"),
        ]));
        let mut agent = orchestrator(test_config(&dir), client.clone());
        let outcome = agent.run().await.unwrap();

        assert_eq!(outcome.reason, StopReason::EndSignal);
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.final_message.as_deref(), Some("Done. END"));
        assert_eq!(outcome.usage.session_total(), 30);
        assert!(std::path::Path::new(&target).exists());

        let requests = client.requests();
        let first = &requests[0];
        assert_eq!(first.messages[0].role, Role::System);
        assert!(first.messages[0].content.as_deref().unwrap().contains("Create hello.txt"));
        assert_eq!(first.messages[1].content.as_deref(), Some(DEFAULT_FIRST_MESSAGE));
        let names: Vec<&str> = first
            .functions
            .as_ref()
            .unwrap()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["create_file", "view_file"]);

        let second = requests[1].messages.last().unwrap();
        assert_eq!(second.role, Role::Function);
        assert_eq!(second.name.as_deref(), Some("create_file"));
        assert!(second.content.as_deref().unwrap().starts_with("[OK] Created file:"));

        assert!(dir.child("memory.json").exists());
        let log = std::fs::read_to_string(dir.child("run.md")).unwrap();
        assert!(log.contains("**Function Call:**") && log.contains("**Output:**"), "{log}");
    }

    #[tokio::test]
    async fn end_with_call_never_dispatches() {
        let dir = TestTempDir::new("agent");
        let target = dir.child_str("never.txt");
        let args = serde_json::json!({ "filepath": target }).to_string();
        let client = Arc::new(ScriptedClient::new(vec![reply(
            Some("END"),
            Some(("create_file", args.as_str())),
        )]));
        let mut agent = orchestrator(test_config(&dir), client);
        let outcome = agent.run().await.unwrap();
        assert_eq!(outcome.reason, StopReason::EndSignal);
        assert_eq!(outcome.steps, 1);
        assert!(!std::path::Path::new(&target).exists());
        assert_eq!(agent.memory().memory().len(), 2);
        assert!(agent
            .memory()
            .memory()
            .iter()
            .all(|entry| entry.message.role != Role::Function));
    }

    // Verifies a reply without a call gets an empty user continuation.
    #[tokio::test]
    async fn reply_without_call_appends_empty_user_turn() {
        let dir = TestTempDir::new("agent");
        let client = Arc::new(ScriptedClient::new(vec![
            text_response("Let me think."),
            text_response("END"),
        ]));
        let mut agent = orchestrator(test_config(&dir), client.clone());
        agent.run().await.unwrap();
        let second = client.requests()[1].messages.clone();
        let last = second.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn step_limit_stops_and_persists() {
        let dir = TestTempDir::new("agent");
        let client = Arc::new(ScriptedClient::new(vec![
            call_response("view_file", r#"{"filepath":"missing.txt"}"#),
            call_response("view_file", r#"{"filepath":"missing.txt"}"#),
            text_response("never reached"),
        ]));
        let mut config = test_config(&dir);
        config.steps_limit = Some(2);
        let mut agent = orchestrator(config, client.clone());
        let outcome = agent.run().await.unwrap();
        assert_eq!(outcome.reason, StopReason::StepLimit);
        assert_eq!(outcome.steps, 2);
        assert_eq!(client.call_count(), 2);
        assert!(dir.child("memory.json").exists());
    }

    // Verifies recoverable dispatch failures are fed back instead of aborting.
    #[tokio::test]
    async fn unknown_command_is_fed_back() {
        let dir = TestTempDir::new("agent");
        let client = Arc::new(ScriptedClient::new(vec![
            call_response("rm_rf", "{}"),
            text_response("END"),
        ]));
        let mut agent = orchestrator(test_config(&dir), client.clone());
        agent.run().await.unwrap();
        let last = client.requests()[1].messages.last().cloned().unwrap();
        assert_eq!(last.content.as_deref(), Some("[ERROR] Unknown command: rm_rf"));
    }

    #[tokio::test]
    async fn planning_sets_plan_after_system_prompt() {
        let dir = TestTempDir::new("agent");
        let client = Arc::new(ScriptedClient::new(vec![
            call_response("make_plan", r#"{"plan":"1. write\n2. test"}"#),
            text_response("END"),
        ]));
        let mut config = test_config(&dir);
        config.planning.active = true;
        let mut agent = orchestrator(config, client.clone());
        agent.run().await.unwrap();
        let requests = client.requests();
        assert!(requests[0].messages[1]
            .content
            .as_deref()
            .unwrap()
            .contains("make_plan"));
        let second = &requests[1].messages;
        assert_eq!(second[1].role, Role::System);
        assert_eq!(second[1].content.as_deref(), Some("1. write\n2. test"));
    }

    #[tokio::test]
    async fn summarization_failure_aborts_run() {
        let dir = TestTempDir::new("agent");
        let mut config = test_config(&dir);
        config.memory.memory_max_tokens = 10;
        let client = Arc::new(ScriptedClient::new(vec![text_response(
            "A reply long enough to push memory over its tiny budget.",
        )]));
        let mut agent = orchestrator(config, client);
        let err = agent.run().await.unwrap_err();
        assert!(matches!(err, AgentError::Summarization(_)), "{err}");
    }

    // Verifies both compaction points run: after the reply and after the
    // continuation message.
    #[tokio::test]
    async fn compaction_keeps_memory_under_budget() {
        let dir = TestTempDir::new("agent");
        let mut config = test_config(&dir);
        config.memory.memory_max_tokens = 60;
        let long = "x".repeat(300);
        let client = Arc::new(ScriptedClient::new(vec![
            text_response(&long),
            text_response("the user asked for a first command"),
            text_response("the assistant wrote a long line"),
            text_response("END"),
        ]));
        let mut agent = orchestrator(config, client.clone());
        agent.run().await.unwrap();
        assert_eq!(client.call_count(), 4);
        assert!(agent.memory().memory_tokens() <= 60);
        let summaries: Vec<_> = agent
            .memory()
            .summary_memory()
            .iter()
            .map(|entry| entry.message.content.clone().unwrap_or_default())
            .collect();
        assert_eq!(
            summaries,
            vec![
                format!("{SUMMARY_PREFIX}the user asked for a first command"),
                format!("{SUMMARY_PREFIX}the assistant wrote a long line"),
            ]
        );
    }

    #[test]
    fn unknown_enabled_command_is_config_error() {
        let mut config = Config::default();
        config.commands = vec!["teleport".into()];
        let err = build_registry(&config).unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }
}
