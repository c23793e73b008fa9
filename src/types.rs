//! Data model for OpenAI-compatible chat requests using function calling.
//!
//! These types serialize directly to the `/chat/completions` payload with
//! the `functions` / `function_call` fields, and deserialize the provider's
//! reply into a [`ModelReply`] the orchestrator can act on.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Message roles
// ---------------------------------------------------------------------------

/// Conversation participant role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction message.
    System,
    /// End-user (or orchestrator) message.
    User,
    /// Assistant/model message.
    Assistant,
    /// Result of a command the assistant called.
    Function,
}

impl Role {
    /// Capitalized label used in summaries and transcripts.
    pub fn label(self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::Function => "Function",
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A single message in the conversation history.
///
/// Every constructor guarantees the message carries `content`, a
/// `function_call`, or both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Author role for this conversation turn.
    pub role: Role,

    /// Text content. Null when the assistant message is purely a function call.
    #[serde(default)]
    pub content: Option<String>,

    /// Function call requested by the assistant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,

    /// When role == Function, the name of the command that produced this result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            function_call: None,
            name: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            function_call: None,
            name: None,
        }
    }

    /// Create an assistant message.
    ///
    /// A reply with neither text nor a call is stored with empty content.
    pub fn assistant(content: Option<String>, function_call: Option<FunctionCall>) -> Self {
        let content = match (&content, &function_call) {
            (None, None) => Some(String::new()),
            _ => content,
        };
        Self {
            role: Role::Assistant,
            content,
            function_call,
            name: None,
        }
    }

    /// Create a function result message, sent back after executing a command.
    pub fn function_result(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: Some(output.into()),
            function_call: None,
            name: Some(name.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Function calls (in assistant responses)
// ---------------------------------------------------------------------------

/// The function name and JSON-encoded arguments the model asked to run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    /// Command name to execute.
    pub name: String,
    /// JSON-encoded string of the arguments object.
    #[serde(default)]
    pub arguments: String,
}

// ---------------------------------------------------------------------------
// Function definitions (sent in requests)
// ---------------------------------------------------------------------------

/// The schema of a callable command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    /// Exposed command name.
    pub name: String,
    /// Natural-language description of the command.
    pub description: String,
    /// JSON Schema object describing the parameters.
    pub parameters: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Chat completion request / response
// ---------------------------------------------------------------------------

/// Request body for POST /chat/completions.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier used for request routing.
    pub model: String,
    /// Conversation history sent to the model.
    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<FunctionDefinition>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            functions: None,
            temperature: None,
        }
    }
}

/// Response body from POST /chat/completions.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// Provider response id.
    #[serde(default)]
    pub id: String,
    /// Ranked response choices.
    pub choices: Vec<Choice>,
    /// Optional token usage metadata.
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// A single choice in the API response.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage reported by the API.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// What the orchestrator needs from one model turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelReply {
    /// Free-form reasoning text, if any.
    pub reasoning: Option<String>,
    /// The single command the model wants to run, if any.
    pub function_call: Option<FunctionCall>,
}

impl ChatResponse {
    /// Reduce the first choice to reasoning text plus an optional call.
    pub fn into_reply(self) -> Result<ModelReply, ApiError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::InvalidResponse("model returned no choices".into()))?;
        Ok(ModelReply {
            reasoning: choice.message.content,
            function_call: choice.message.function_call,
        })
    }
}
