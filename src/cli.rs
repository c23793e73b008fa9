//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// A coding agent for the terminal. Works with any OpenAI-compatible API.
#[derive(Debug, Parser)]
#[command(name = "codemate", version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Task for the agent; overrides `task` from the config.
    #[arg(short = 't', long = "task")]
    pub task: Option<String>,

    /// Path to config file (default: ./codemate.toml or ~/.config/codemate/codemate.toml).
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Write the transcript to this markdown file.
    #[arg(long = "log", value_name = "PATH")]
    pub log: Option<String>,

    /// Enabled commands for this run.
    #[arg(long = "commands", num_args = 1.., value_name = "COMMAND")]
    pub commands: Option<Vec<String>>,

    /// Stop after this many model turns.
    #[arg(long = "steps-limit", value_name = "N")]
    pub steps_limit: Option<usize>,

    /// Ask the model for a plan before the first command.
    #[arg(long = "planning")]
    pub planning: bool,

    /// Override model name.
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Disable color output.
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Enable debug logging to stderr.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Write a starter command plugin.
    InitCommand(InitArgs),
    /// Write a starter policy plugin.
    InitPolicy(InitArgs),
    /// Write a starter model client profile.
    InitClient(InitArgs),
    /// Store a secret for `api_key_env` lookups.
    AddSecret { key: String, value: String },
    RemoveSecret { key: String },
    /// Delete every stored secret.
    ClearSecrets,
}

#[derive(Debug, clap::Args, PartialEq, Eq)]
pub struct InitArgs {
    pub name: String,
    /// Target directory instead of the default under `.codemate/`.
    #[arg(long = "dir")]
    pub dir: Option<PathBuf>,
}
