//! Top-level config loading pipeline.
//!
//! The pipeline is: read the global, local and explicit config files that
//! exist, deep-merge them in that order over the embedded defaults, resolve the active model profile and API key, then apply
//! environment overrides. File and environment access go through injected
//! closures so every step is testable without touching the real system.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ConfigError;

use super::defaults::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_CONFIG_TEMPLATE, DEFAULT_INTRODUCTION_PROMPT,
};
use super::types::{ApiConfig, CliOverrides, Config, FileConfig, ModelConfig};

/// One layer of the effective config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Local,
    Global(PathBuf),
    BuiltInDefaults,
}

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from --config flag).
/// `secrets` backs `api_key_env` lookups when the process environment lacks
/// the variable.
pub fn load_config(
    path_override: Option<&str>,
    secrets: &BTreeMap<String, String>,
) -> Result<Config, ConfigError> {
    let (config, sources) = load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok().or_else(|| secrets.get(name).cloned()),
        config_root_dir,
    )?;
    debug!(sources = ?sources, model = %config.api.model, "configuration loaded");
    Ok(config)
}

/// Platform config root (`$XDG_CONFIG_HOME` or `~/.config` on Linux).
pub fn config_root_dir() -> Option<PathBuf> {
    dirs::config_dir()
}

/// Directory holding the global `codemate.toml` and the secrets file.
pub fn global_config_dir() -> Option<PathBuf> {
    config_root_dir().map(|root| root.join(CONFIG_DIR_NAME))
}

pub(crate) fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<(Config, Vec<ConfigSource>), ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let layers = read_config_layers(path_override, &read_file, &config_root)?;
    let mut sources = vec![ConfigSource::BuiltInDefaults];
    let mut tables = Vec::with_capacity(layers.len());
    for (text, source) in layers {
        tables.push(toml::from_str::<toml::Table>(&text)?);
        sources.push(source);
    }
    let parsed = merge_over_defaults(tables)?;
    let mut config = resolve_config(parsed)?;
    load_client_profiles(&mut config, &read_file)?;
    config.api = resolve_active_api(&config.models, &config.api.profile, &env_lookup)?;
    apply_env_overrides(&mut config, &env_lookup);
    Ok((config, sources))
}

/// Config files that exist, lowest precedence first: global, local, explicit.
///
/// Missing global and local files are skipped; a missing explicit file is an
/// error.
fn read_config_layers<FRead, FRoot>(
    path_override: Option<&str>,
    read_file: &FRead,
    config_root: &FRoot,
) -> Result<Vec<(String, ConfigSource)>, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let mut layers = Vec::new();
    if let Some(dir) = config_root() {
        let global = dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if let Ok(text) = read_file(&global) {
            layers.push((text, ConfigSource::Global(global)));
        }
    }
    if let Ok(text) = read_file(Path::new(CONFIG_FILE_NAME)) {
        layers.push((text, ConfigSource::Local));
    }
    if let Some(p) = path_override {
        let path = PathBuf::from(p);
        let text = read_file(&path)?;
        layers.push((text, ConfigSource::Explicit(path)));
    }
    Ok(layers)
}

/// Deep-merge `layers` in order over the embedded template.
///
/// Tables merge key by key; any other value (arrays included) replaces the
/// earlier one wholesale.
fn merge_over_defaults(layers: Vec<toml::Table>) -> Result<FileConfig, ConfigError> {
    let mut base: toml::Table = toml::from_str(DEFAULT_CONFIG_TEMPLATE)?;
    for layer in layers {
        merge_tables(&mut base, layer);
    }
    Ok(toml::Value::Table(base).try_into()?)
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn resolve_config(parsed: FileConfig) -> Result<Config, ConfigError> {
    let profile = normalized(&parsed.model).ok_or_else(|| {
        ConfigError::Invalid("`model` must name a profile from [models.<name>]".into())
    })?;
    if parsed.memory.memory_max_tokens == 0 || parsed.memory.summary_memory_max_tokens == 0 {
        return Err(ConfigError::Invalid(
            "memory budgets must be greater than zero".into(),
        ));
    }
    Ok(Config {
        task: parsed.task.and_then(|t| normalized(&t)),
        introduction_prompt: parsed
            .introduction_prompt
            .unwrap_or_else(|| DEFAULT_INTRODUCTION_PROMPT.to_string()),
        commands: parsed.commands,
        steps_limit: parsed.steps_limit,
        memory_file: parsed.memory_file,
        custom_commands_paths: parsed.custom_commands_paths,
        custom_policies_paths: parsed.custom_policies_paths,
        custom_clients_paths: parsed.custom_clients_paths,
        log: parsed.log,
        planning: parsed.planning,
        memory: parsed.memory,
        api: ApiConfig {
            profile,
            ..ApiConfig::default()
        },
        models: parsed.models,
        policies: parsed.policies,
    })
}

/// Merge `<name>.toml` profile files from the client directories into `models`.
fn load_client_profiles<FRead>(config: &mut Config, read_file: &FRead) -> Result<(), ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
{
    for dir in &config.custom_clients_paths {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();
        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };
            let text = read_file(&path)?;
            let profile: ModelConfig = toml::from_str(&text)?;
            if config.models.insert(name.clone(), profile).is_some() {
                warn!(profile = %name, path = %path.display(), "client file overrides model profile");
            }
        }
    }
    Ok(())
}

/// Resolve the selected profile into concrete API settings.
///
/// Key precedence: `CODEMATE_API_KEY`, then the profile's `api_key_env`,
/// then its inline `api_key`.
pub(crate) fn resolve_active_api<FEnv>(
    models: &BTreeMap<String, ModelConfig>,
    profile: &str,
    env_lookup: &FEnv,
) -> Result<ApiConfig, ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    let model = models.get(profile).ok_or_else(|| {
        ConfigError::Invalid(format!(
            "model profile `{profile}` is not defined under [models]"
        ))
    })?;
    let api_key = env_lookup("CODEMATE_API_KEY")
        .and_then(|v| normalized(&v))
        .or_else(|| {
            model
                .api_key_env
                .as_deref()
                .and_then(|name| env_lookup(name))
                .and_then(|v| normalized(&v))
        })
        .unwrap_or_else(|| model.api_key.trim().to_string());
    Ok(ApiConfig {
        base_url: model.base_url.trim_end_matches('/').to_string(),
        api_key,
        model: model
            .model
            .as_deref()
            .and_then(normalized)
            .unwrap_or_else(|| profile.to_string()),
        timeout_secs: model.timeout_secs,
        temperature: model.temperature,
        profile: profile.to_string(),
    })
}

fn apply_env_overrides<FEnv>(config: &mut Config, env_lookup: &FEnv)
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(url) = env_lookup("CODEMATE_BASE_URL").and_then(|v| normalized(&v)) {
        config.api.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(model) = env_lookup("CODEMATE_MODEL").and_then(|v| normalized(&v)) {
        config.api.model = model;
    }
}

/// Apply CLI flags and check the result is runnable.
pub fn apply_cli_overrides(config: &mut Config, cli: CliOverrides) -> Result<(), ConfigError> {
    if let Some(task) = cli.task.and_then(|t| normalized(&t)) {
        config.task = Some(task);
    }
    if let Some(log) = cli.log {
        config.log.filepath = log;
        config.log.active = true;
    }
    if let Some(commands) = cli.commands {
        config.commands = commands;
    }
    if cli.steps_limit.is_some() {
        config.steps_limit = cli.steps_limit;
    }
    if cli.planning {
        config.planning.active = true;
    }
    if let Some(model) = cli.model.and_then(|m| normalized(&m)) {
        config.api.model = model;
    }
    validate_runnable(config)
}

/// Startup checks that must pass before the loop begins.
pub fn validate_runnable(config: &Config) -> Result<(), ConfigError> {
    if config.task.is_none() {
        return Err(ConfigError::Invalid(
            "no task given; pass --task or set `task` in the config".into(),
        ));
    }
    if config.log.active && !config.log.filepath.ends_with(".md") {
        return Err(ConfigError::Invalid(format!(
            "log file `{}` must have a .md extension",
            config.log.filepath
        )));
    }
    if config.steps_limit == Some(0) {
        return Err(ConfigError::Invalid(
            "steps_limit must be at least 1".into(),
        ));
    }
    Ok(())
}

fn normalized(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
