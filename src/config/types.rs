//! Configuration data model.
//!
//! This module holds struct definitions plus default values. Source lookup,
//! merging and resolution live in `config::loader`.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::defaults::{
    DEFAULT_API_BASE_URL, DEFAULT_API_KEY_ENV, DEFAULT_API_TIMEOUT_SECS,
    DEFAULT_INTRODUCTION_PROMPT, DEFAULT_LOG_FILE, DEFAULT_MEMORY_FILE,
    DEFAULT_MEMORY_MAX_TOKENS, DEFAULT_MODEL_ID, DEFAULT_MODEL_PROFILE_NAME,
    DEFAULT_PLANNING_PROMPT, DEFAULT_SUMMARY_MEMORY_MAX_TOKENS,
};

/// Fully resolved runtime configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Task description substituted into the introduction prompt.
    pub task: Option<String>,
    pub introduction_prompt: String,
    /// Enabled command subset.
    pub commands: Vec<String>,
    /// Optional cap on model turns.
    pub steps_limit: Option<usize>,
    /// Path of the final memory snapshot.
    pub memory_file: String,
    pub custom_commands_paths: Vec<String>,
    pub custom_policies_paths: Vec<String>,
    pub custom_clients_paths: Vec<String>,
    pub log: LogConfig,
    pub planning: PlanningConfig,
    pub memory: MemoryConfig,
    /// Resolved active API settings from `model` + `models.<name>`.
    pub api: ApiConfig,
    /// Configured model profiles keyed by profile name.
    pub models: BTreeMap<String, ModelConfig>,
    pub policies: Vec<PolicyBinding>,
}

impl Default for Config {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert(DEFAULT_MODEL_PROFILE_NAME.to_string(), ModelConfig::default());
        Self {
            task: None,
            introduction_prompt: DEFAULT_INTRODUCTION_PROMPT.to_string(),
            commands: Vec::new(),
            steps_limit: None,
            memory_file: DEFAULT_MEMORY_FILE.to_string(),
            custom_commands_paths: Vec::new(),
            custom_policies_paths: Vec::new(),
            custom_clients_paths: Vec::new(),
            log: LogConfig::default(),
            planning: PlanningConfig::default(),
            memory: MemoryConfig::default(),
            api: ApiConfig::default(),
            models,
            policies: Vec::new(),
        }
    }
}

/// On-disk shape of `codemate.toml` after merging over the defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub task: Option<String>,
    pub introduction_prompt: Option<String>,
    pub commands: Vec<String>,
    pub steps_limit: Option<usize>,
    pub memory_file: String,
    pub custom_commands_paths: Vec<String>,
    pub custom_policies_paths: Vec<String>,
    pub custom_clients_paths: Vec<String>,
    pub model: String,
    pub log: LogConfig,
    pub planning: PlanningConfig,
    pub memory: MemoryConfig,
    pub models: BTreeMap<String, ModelConfig>,
    #[serde(rename = "policy")]
    pub policies: Vec<PolicyBinding>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            task: None,
            introduction_prompt: None,
            commands: Vec::new(),
            steps_limit: None,
            memory_file: DEFAULT_MEMORY_FILE.to_string(),
            custom_commands_paths: Vec::new(),
            custom_policies_paths: Vec::new(),
            custom_clients_paths: Vec::new(),
            model: DEFAULT_MODEL_PROFILE_NAME.to_string(),
            log: LogConfig::default(),
            planning: PlanningConfig::default(),
            memory: MemoryConfig::default(),
            models: BTreeMap::new(),
            policies: Vec::new(),
        }
    }
}

/// Transcript log settings under `[log]`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub active: bool,
    /// Markdown file the transcript is written to.
    pub filepath: String,
    /// Fold command output into `<details>` blocks.
    pub spoiler: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            active: true,
            filepath: DEFAULT_LOG_FILE.to_string(),
            spoiler: false,
        }
    }
}

/// Planning mode settings under `[planning]`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlanningConfig {
    pub active: bool,
    /// First message sent when planning is active.
    pub prompt: String,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            active: false,
            prompt: DEFAULT_PLANNING_PROMPT.to_string(),
        }
    }
}

/// Conversation memory budgets under `[memory]`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryConfig {
    pub memory_max_tokens: usize,
    pub summary_memory_max_tokens: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memory_max_tokens: DEFAULT_MEMORY_MAX_TOKENS,
            summary_memory_max_tokens: DEFAULT_SUMMARY_MEMORY_MAX_TOKENS,
        }
    }
}

/// Model-profile settings stored under `[models.<name>]` or in a client file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    #[serde(alias = "api_base_url")]
    pub base_url: String,
    pub api_key: String,
    pub api_key_env: Option<String>,
    /// Optional concrete model id; defaults to the profile key when omitted.
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub temperature: Option<f64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: String::new(),
            api_key_env: Some(DEFAULT_API_KEY_ENV.to_string()),
            model: Some(DEFAULT_MODEL_ID.to_string()),
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            temperature: None,
        }
    }
}

/// Resolved API connection settings used by the runtime HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: Option<f64>,
    /// Selected profile key.
    pub profile: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL_ID.to_string(),
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            temperature: None,
            profile: DEFAULT_MODEL_PROFILE_NAME.to_string(),
        }
    }
}

/// One `[[policy]]` table: a policy kind attached to a set of commands.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PolicyBinding {
    /// Built-in or plugin policy kind.
    pub kind: String,
    /// Commands the policy guards, in evaluation order.
    pub commands: Vec<String>,
    /// Kind-specific settings.
    #[serde(default)]
    pub config: toml::Table,
}

/// Overrides collected from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub task: Option<String>,
    pub log: Option<String>,
    pub commands: Option<Vec<String>>,
    pub steps_limit: Option<usize>,
    pub planning: bool,
    pub model: Option<String>,
}
