//! Unified error types for the agent.
//!
//! Two families live here. [`DispatchError`] covers everything a model can
//! cause through a bad function call; it never escapes the dispatcher and is
//! rendered back into the conversation. Everything else is fatal for the run.

use std::fmt;

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// What went wrong with one input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    /// A required field was absent (or null).
    Missing,
    /// The value had the wrong JSON type.
    WrongType { expected: &'static str },
    /// The field is not part of the schema.
    Unknown,
}

/// A single per-field validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub problem: FieldProblem,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            FieldProblem::Missing => write!(f, "{}: field required", self.field),
            FieldProblem::WrongType { expected } => {
                write!(f, "{}: expected {expected}", self.field)
            }
            FieldProblem::Unknown => write!(f, "{}: unknown field", self.field),
        }
    }
}

/// Structured failure from validating raw arguments against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The argument string was not valid JSON.
    MalformedJson(String),
    /// The arguments parsed, but not to a JSON object.
    NotAnObject,
    /// One or more fields failed their schema constraints.
    Fields(Vec<FieldIssue>),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedJson(msg) => write!(f, "arguments are not valid JSON: {msg}"),
            Self::NotAnObject => write!(f, "arguments must be a JSON object"),
            Self::Fields(issues) => {
                let parts: Vec<String> = issues.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join("; "))
            }
        }
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// CommandError
// ---------------------------------------------------------------------------

/// Errors raised by a command handler's own logic.
#[derive(Debug)]
pub enum CommandError {
    /// The handler received input it cannot work with.
    InvalidInput(String),
    /// The handler ran but failed.
    Failed(String),
    Io(std::io::Error),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Failed(msg) => write!(f, "{msg}"),
            Self::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// DispatchError (recoverable)
// ---------------------------------------------------------------------------

/// Recoverable failures of one dispatched function call.
///
/// These are turned into conversation text with [`DispatchError::feedback`]
/// so the model can correct itself; they never abort the run.
#[derive(Debug)]
pub enum DispatchError {
    /// The model asked for a command that is not registered.
    UnknownCommand(String),
    /// Arguments failed schema validation.
    InvalidArguments {
        command: String,
        handler: String,
        detail: ValidationError,
    },
    /// A policy vetoed the invocation.
    PolicyDenied { policy: String, reason: String },
    /// The handler failed or panicked.
    HandlerFailure(String),
}

impl DispatchError {
    /// Text fed back to the model in place of a command result.
    pub fn feedback(&self) -> String {
        match self {
            Self::UnknownCommand(name) => format!("[ERROR] Unknown command: {name}"),
            Self::InvalidArguments {
                handler, detail, ..
            } => format!("[ERROR] Invalid command input [{handler}]: {detail}"),
            Self::PolicyDenied { policy, reason } => format!("[DENIED] {policy}: {reason}"),
            Self::HandlerFailure(msg) => format!("[ERROR] Command execution failed: {msg}"),
        }
    }

    /// Short stable label used in audit logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) => "unknown_command",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::PolicyDenied { .. } => "policy_denied",
            Self::HandlerFailure(_) => "handler_failure",
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand(name) => write!(f, "unknown command: {name}"),
            Self::InvalidArguments {
                command, detail, ..
            } => write!(f, "invalid arguments for {command}: {detail}"),
            Self::PolicyDenied { policy, reason } => {
                write!(f, "denied by policy {policy}: {reason}")
            }
            Self::HandlerFailure(msg) => write!(f, "handler failure: {msg}"),
        }
    }
}

impl std::error::Error for DispatchError {}

// ---------------------------------------------------------------------------
// PolicyError (fatal)
// ---------------------------------------------------------------------------

/// Policy failures that indicate an integration bug rather than a denial.
#[derive(Debug)]
pub enum PolicyError {
    /// The policy replied with something other than `true` or a reason string.
    ContractViolation { policy: String, reply: String },
    /// An external policy program could not be run or answered unreadably.
    Unavailable { policy: String, message: String },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContractViolation { policy, reply } => write!(
                f,
                "policy `{policy}` returned {reply}; a policy must return true or a denial reason"
            ),
            Self::Unavailable { policy, message } => {
                write!(f, "policy `{policy}` could not be evaluated: {message}")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration and plugins.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
    /// A command or policy plugin file failed its shape checks.
    Plugin { path: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
            Self::Plugin { path, message } => write!(f, "plugin {path}: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Errors from the HTTP API layer.
#[derive(Debug)]
pub enum ApiError {
    /// Network / reqwest-level error.
    Http(reqwest::Error),
    /// Non-2xx status from the API.
    Status {
        code: u16,
        body: String,
        retry_after_secs: Option<u64>,
    },
    /// The provider answered with a payload we cannot use.
    InvalidResponse(String),
}

impl ApiError {
    pub fn status(code: u16, body: String, retry_after_secs: Option<u64>) -> Self {
        Self::Status {
            code,
            body,
            retry_after_secs,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Status {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "http: {e}"),
            Self::Status { code, body, .. } => write!(f, "status {code}: {body}"),
            Self::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

// ---------------------------------------------------------------------------
// AgentError: top-level
// ---------------------------------------------------------------------------

/// Top-level fatal error for one agent run.
#[derive(Debug)]
pub enum AgentError {
    Config(ConfigError),
    /// A chat request failed.
    Api(ApiError),
    /// Compaction could not summarize evicted history.
    Summarization(ApiError),
    Policy(PolicyError),
    /// The final memory snapshot could not be written.
    Persist(std::io::Error),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Api(e) => write!(f, "api: {e}"),
            Self::Summarization(e) => write!(f, "summarization failed: {e}"),
            Self::Policy(e) => write!(f, "policy: {e}"),
            Self::Persist(e) => write!(f, "could not persist memory: {e}"),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<ConfigError> for AgentError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ApiError> for AgentError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

impl From<PolicyError> for AgentError {
    fn from(e: PolicyError) -> Self {
        Self::Policy(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verifies each recoverable kind renders the prefix the model is taught to read.
    #[test]
    fn dispatch_feedback_prefixes() {
        assert_eq!(
            DispatchError::UnknownCommand("nope".into()).feedback(),
            "[ERROR] Unknown command: nope"
        );
        let invalid = DispatchError::InvalidArguments {
            command: "view_file".into(),
            handler: "view_file".into(),
            detail: ValidationError::Fields(vec![FieldIssue {
                field: "filepath".into(),
                problem: FieldProblem::Missing,
            }]),
        };
        assert_eq!(
            invalid.feedback(),
            "[ERROR] Invalid command input [view_file]: filepath: field required"
        );
        let denied = DispatchError::PolicyDenied {
            policy: "deny_if_field_in_blacklist".into(),
            reason: "nope".into(),
        };
        assert_eq!(denied.feedback(), "[DENIED] deny_if_field_in_blacklist: nope");
        assert_eq!(
            DispatchError::HandlerFailure("boom".into()).feedback(),
            "[ERROR] Command execution failed: boom"
        );
    }

    // Verifies multiple field issues are joined in schema order.
    #[test]
    fn validation_error_joins_issues() {
        let err = ValidationError::Fields(vec![
            FieldIssue {
                field: "a".into(),
                problem: FieldProblem::WrongType {
                    expected: "integer",
                },
            },
            FieldIssue {
                field: "b".into(),
                problem: FieldProblem::Unknown,
            },
        ]);
        assert_eq!(err.to_string(), "a: expected integer; b: unknown field");
    }

    #[test]
    fn config_error_from_toml() {
        let toml_err: toml::de::Error = toml::from_str::<toml::Value>("x = [unclosed").unwrap_err();
        let e = ConfigError::from(toml_err);
        assert!(e.to_string().starts_with("toml:"));
    }

    #[test]
    fn policy_contract_violation_message_is_fixed() {
        let e = PolicyError::ContractViolation {
            policy: "weird".into(),
            reply: "1".into(),
        };
        assert_eq!(
            e.to_string(),
            "policy `weird` returned 1; a policy must return true or a denial reason"
        );
    }

    #[test]
    fn agent_error_wraps_summarization_failure() {
        let ae = AgentError::Summarization(ApiError::InvalidResponse("empty".into()));
        assert_eq!(
            ae.to_string(),
            "summarization failed: invalid response: empty"
        );
    }
}
