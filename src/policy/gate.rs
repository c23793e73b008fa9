//! Ordered, short-circuiting policy evaluation.

use super::{Policy, PolicyRequest, PolicyVerdict};
use crate::commands::ExecutionContext;
use crate::error::PolicyError;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Denied { policy: String, reason: String },
}

/// Run `policies` in order and stop at the first denial.
pub async fn evaluate(
    policies: &[Arc<dyn Policy>],
    request: &PolicyRequest<'_>,
    ctx: &ExecutionContext,
) -> Result<GateDecision, PolicyError> {
    for policy in policies {
        match policy.check(request, ctx).await? {
            PolicyVerdict::Allow => {
                debug!(policy = policy.name(), command = request.command, "policy allowed");
            }
            PolicyVerdict::Deny(reason) => {
                return Ok(GateDecision::Denied {
                    policy: policy.name().to_string(),
                    reason,
                });
            }
        }
    }
    Ok(GateDecision::Allowed)
}
