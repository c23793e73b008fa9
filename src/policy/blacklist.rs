//! Deny invocations whose fields match glob patterns.

use super::{Policy, PolicyRequest, PolicyVerdict};
use crate::commands::ExecutionContext;
use crate::error::{ConfigError, PolicyError};
use async_trait::async_trait;
use glob::Pattern;
use serde::Deserialize;
use serde_json::Value;

pub const KIND: &str = "deny_if_field_in_blacklist";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlacklistConfig {
    fields: Vec<String>,
    blacklist: Vec<String>,
}

/// Denies when any configured field's value fully matches a blacklisted glob.
///
/// Matching is case-sensitive and `*` also matches path separators.
#[derive(Debug)]
pub struct DenyIfFieldInBlacklist {
    fields: Vec<String>,
    patterns: Vec<Pattern>,
}

impl DenyIfFieldInBlacklist {
    pub fn new(fields: Vec<String>, blacklist: &[String]) -> Result<Self, ConfigError> {
        let patterns = blacklist
            .iter()
            .map(|raw| {
                Pattern::new(raw).map_err(|e| {
                    ConfigError::Invalid(format!("{KIND}: bad pattern `{raw}`: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { fields, patterns })
    }

    /// Build from a `[[policy]]` `config` table.
    pub fn from_table(table: &toml::Table) -> Result<Self, ConfigError> {
        let config: BlacklistConfig = toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Invalid(format!("{KIND}: {e}")))?;
        Self::new(config.fields, &config.blacklist)
    }

    fn first_match(&self, candidates: &[String]) -> Option<&Pattern> {
        candidates
            .iter()
            .find_map(|value| self.patterns.iter().find(|pattern| pattern.matches(value)))
    }
}

/// String forms of one field value; lists contribute each element.
fn candidates(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(candidates).collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

#[async_trait]
impl Policy for DenyIfFieldInBlacklist {
    fn name(&self) -> &str {
        KIND
    }

    async fn check(
        &self,
        request: &PolicyRequest<'_>,
        _ctx: &ExecutionContext,
    ) -> Result<PolicyVerdict, PolicyError> {
        for field in &self.fields {
            let Some(value) = request.input.field_value(field) else {
                continue;
            };
            if let Some(pattern) = self.first_match(&candidates(value)) {
                return Ok(PolicyVerdict::Deny(format!(
                    "Field '{field}' matches blacklisted pattern '{}'",
                    pattern.as_str()
                )));
            }
        }
        Ok(PolicyVerdict::Allow)
    }
}
