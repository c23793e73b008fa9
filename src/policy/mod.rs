//! Pre-execution policies.
//!
//! A policy inspects a validated invocation and answers allow or deny. The
//! answer protocol is strict: `true` allows, a string denies with that
//! reason, and anything else is a broken policy that aborts the run.

pub mod blacklist;
pub mod catalog;
pub mod confirm;
pub mod external;
pub mod gate;

use crate::commands::{CommandInput, ExecutionContext};
use crate::error::PolicyError;
use async_trait::async_trait;
use serde_json::Value;

pub use blacklist::DenyIfFieldInBlacklist;
pub use catalog::PolicyCatalog;
pub use confirm::RequireUserConfirmation;
pub use external::ExternalPolicy;
pub use gate::{evaluate, GateDecision};

/// The invocation a policy is asked about.
#[derive(Debug, Clone, Copy)]
pub struct PolicyRequest<'a> {
    pub command: &'a str,
    pub handler: &'a str,
    pub input: &'a CommandInput,
}

/// Answer from one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    Allow,
    Deny(String),
}

impl PolicyVerdict {
    /// Interpret a JSON reply under the `true`-or-reason protocol.
    pub fn from_reply(policy: &str, reply: &Value) -> Result<Self, PolicyError> {
        match reply {
            Value::Bool(true) => Ok(Self::Allow),
            Value::String(reason) => Ok(Self::Deny(reason.clone())),
            other => Err(PolicyError::ContractViolation {
                policy: policy.to_string(),
                reply: other.to_string(),
            }),
        }
    }
}

#[async_trait]
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    async fn check(
        &self,
        request: &PolicyRequest<'_>,
        ctx: &ExecutionContext,
    ) -> Result<PolicyVerdict, PolicyError>;
}
