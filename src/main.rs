//! CLI entry point for codemate.

mod cli;

use clap::Parser;
use cli::{Args, Command, InitArgs};
use codemate::agent::{build_registry, Orchestrator, StopReason};
use codemate::api::ApiClient;
use codemate::config::{apply_cli_overrides, load_config, CliOverrides};
use codemate::scaffold::{scaffold, PluginKind};
use codemate::secrets::SecretsStore;
use codemate::ui::{RenderSink, Renderer};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let mut args = Args::parse();
    init_tracing(args.verbose);
    let renderer = Renderer::new(!args.no_color);

    let result = match args.command.take() {
        Some(command) => run_subcommand(command, &renderer),
        None => run_agent(args, renderer).await,
    };
    if let Err(message) = result {
        renderer.error(&message);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "codemate=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn secrets_store() -> Result<SecretsStore, String> {
    SecretsStore::default_location()
        .ok_or_else(|| "could not determine the config directory for secrets".to_string())
}

fn run_subcommand(command: Command, renderer: &Renderer) -> Result<(), String> {
    let init = |kind: PluginKind, args: InitArgs| -> Result<(), String> {
        let written = scaffold(kind, &args.name, args.dir.as_deref()).map_err(|e| e.to_string())?;
        for path in written {
            renderer.notice(&format!("wrote {}", path.display()));
        }
        Ok(())
    };
    match command {
        Command::InitCommand(args) => init(PluginKind::Command, args),
        Command::InitPolicy(args) => init(PluginKind::Policy, args),
        Command::InitClient(args) => init(PluginKind::Client, args),
        Command::AddSecret { key, value } => {
            let store = secrets_store()?;
            store.add(&key, &value).map_err(|e| e.to_string())?;
            renderer.notice(&format!("secret `{key}` saved to {}", store.path().display()));
            Ok(())
        }
        Command::RemoveSecret { key } => {
            let store = secrets_store()?;
            if store.remove(&key).map_err(|e| e.to_string())? {
                renderer.notice(&format!("secret `{key}` removed"));
            } else {
                renderer.warn(&format!("no secret named `{key}`"));
            }
            Ok(())
        }
        Command::ClearSecrets => {
            secrets_store()?.clear().map_err(|e| e.to_string())?;
            renderer.notice("all secrets removed");
            Ok(())
        }
    }
}

async fn run_agent(args: Args, renderer: Renderer) -> Result<(), String> {
    let secrets = match SecretsStore::default_location() {
        Some(store) => store.load().unwrap_or_else(|e| {
            warn!(error = %e, "could not read secrets file");
            BTreeMap::new()
        }),
        None => BTreeMap::new(),
    };

    let mut config = load_config(args.config.as_deref(), &secrets).map_err(|e| e.to_string())?;
    apply_cli_overrides(
        &mut config,
        CliOverrides {
            task: args.task,
            log: args.log,
            commands: args.commands,
            steps_limit: args.steps_limit,
            planning: args.planning,
            model: args.model,
        },
    )
    .map_err(|e| e.to_string())?;

    let registry = build_registry(&config).map_err(|e| e.to_string())?;
    let client = Arc::new(ApiClient::new(&config.api));
    let mut agent = Orchestrator::new(config, registry, client)
        .map_err(|e| e.to_string())?
        .with_sink(Arc::new(renderer));

    let outcome = agent.run().await.map_err(|e| e.to_string())?;
    match outcome.reason {
        StopReason::EndSignal => renderer.notice(&format!("Task finished in {} step(s).", outcome.steps)),
        StopReason::StepLimit => renderer.warn(&format!("Stopped after {} step(s) without END.", outcome.steps)),
    }
    renderer.notice(&format!(
        "Memory saved to {} ({} tokens used).",
        outcome.memory_file.display(),
        outcome.usage.session_total()
    ));
    if let Some(message) = outcome.final_message {
        println!("{message}");
    }
    Ok(())
}
