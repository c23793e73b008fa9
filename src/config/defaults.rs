//! Default configuration constants and embedded templates.
//!
//! Keeping defaults in one module means the serde `Default` impls and the
//! shipped `codemate.toml` template cannot drift on literals.

/// Embedded default `codemate.toml`, merged under every user config.
pub(crate) const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../templates/codemate.toml");
/// Built-in introduction prompt with `{{TASK}}` and `{{COMMANDS}}` placeholders.
pub(crate) const DEFAULT_INTRODUCTION_PROMPT: &str =
    include_str!("../templates/introduction_prompt.md");
/// Default profile key selected when no profile is specified.
pub(crate) const DEFAULT_MODEL_PROFILE_NAME: &str = "openai";
/// Default provider model ID used by the default profile.
pub(crate) const DEFAULT_MODEL_ID: &str = "gpt-4o";
/// Default OpenAI-compatible API base URL.
pub(crate) const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
/// Default timeout for model API requests.
pub(crate) const DEFAULT_API_TIMEOUT_SECS: u64 = 120;
/// Environment variable holding the default profile's key.
pub(crate) const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// First user message when planning is inactive.
pub(crate) const DEFAULT_FIRST_MESSAGE: &str = "Starting now. First command?";
/// Default planning instruction sent as the first message.
pub(crate) const DEFAULT_PLANNING_PROMPT: &str =
    "Before running any command, call make_plan with a short numbered plan for the task.";
pub(crate) const DEFAULT_MEMORY_MAX_TOKENS: usize = 15_000;
pub(crate) const DEFAULT_SUMMARY_MEMORY_MAX_TOKENS: usize = 5_000;
pub(crate) const DEFAULT_MEMORY_FILE: &str = "memory.json";
pub(crate) const DEFAULT_LOG_FILE: &str = "codemate.md";
/// Global config directory name under the platform config root.
pub(crate) const CONFIG_DIR_NAME: &str = "codemate";
/// Local and global config file name.
pub(crate) const CONFIG_FILE_NAME: &str = "codemate.toml";
