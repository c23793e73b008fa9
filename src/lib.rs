//! Codemate: a coding agent loop for OpenAI-compatible APIs.
//!
//! The model works on a task by calling structured commands (file I/O,
//! code search, Python tooling). Every call is validated against the
//! command's schema, gated by configured policies, and answered with text,
//! while conversation memory is kept under a token budget by summarizing
//! older turns.
//!
//! # Quick start
//!
//! ```no_run
//! use codemate::agent::{build_registry, Orchestrator};
//! use codemate::api::ApiClient;
//! use codemate::config::load_config;
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = load_config(None, &BTreeMap::new())?;
//! config.task = Some("Add a docstring to main.py".into());
//! let registry = build_registry(&config)?;
//! let client = Arc::new(ApiClient::new(&config.api));
//! let outcome = Orchestrator::new(config, registry, client)?.run().await?;
//! println!("{:?} after {} steps", outcome.reason, outcome.steps);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod memory;
pub mod policy;
pub mod scaffold;
pub mod secrets;
#[cfg(test)]
pub mod testsupport;
pub mod textutil;
pub mod tokens;
pub mod transcript;
pub mod types;
pub mod ui;
