//! Configuration loading from TOML files and environment variables.
//!
//! Config is resolved in this order of precedence (highest wins):
//! 1. CLI flags (`--task`, `--log`, `--commands`, `--steps-limit`, ...)
//! 2. Environment variables (`CODEMATE_API_KEY`, `CODEMATE_BASE_URL`,
//!    `CODEMATE_MODEL`)
//! 3. TOML file specified via --config CLI flag
//! 4. ./codemate.toml in the current directory
//! 5. $XDG_CONFIG_HOME/codemate/codemate.toml (or ~/.config/codemate/)
//! 6. Built-in defaults (`templates/codemate.toml`)

mod defaults;
mod loader;
mod types;

pub(crate) use defaults::DEFAULT_FIRST_MESSAGE;
pub use loader::{
    apply_cli_overrides, config_root_dir, global_config_dir, load_config, validate_runnable,
    ConfigSource,
};
pub use types::{
    ApiConfig, CliOverrides, Config, LogConfig, MemoryConfig, ModelConfig, PlanningConfig,
    PolicyBinding,
};
