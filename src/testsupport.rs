//! Shared test fixtures: temp dirs, a scripted model client and reply builders.

use crate::api::ModelClient;
use crate::error::ApiError;
use crate::types::{ChatRequest, ChatResponse, Choice, FunctionCall, Message, Usage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{SystemTime, UNIX_EPOCH};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory fixture with best-effort cleanup.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    /// Create a unique temporary directory with a readable prefix.
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!("codemate-{prefix}-{millis}-{suffix}"));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build a child path under the fixture root.
    pub fn child(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    /// Child path as an owned string, for command inputs.
    pub fn child_str(&self, relative: &str) -> String {
        self.child(relative).to_string_lossy().into_owned()
    }

    /// Write UTF-8 text to a child path, creating parent directories as needed.
    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.child(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories for fixture");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Model client that replays queued responses in order and records requests.
///
/// Running out of responses yields an `InvalidResponse` error.
pub struct ScriptedClient {
    responses: StdMutex<VecDeque<Result<ChatResponse, ApiError>>>,
    requests: StdMutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<ChatResponse, ApiError>>) -> Self {
        Self {
            responses: StdMutex::new(results.into()),
            requests: StdMutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("lock poisoned").len()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        self.requests
            .lock()
            .expect("lock poisoned")
            .push(request.clone());
        self.responses
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::InvalidResponse("script exhausted".into())))
    }
}

/// Response with assistant text and an optional call.
pub fn reply(content: Option<&str>, call: Option<(&str, &str)>) -> ChatResponse {
    let function_call = call.map(|(name, arguments)| FunctionCall {
        name: name.to_string(),
        arguments: arguments.to_string(),
    });
    ChatResponse {
        id: "test".into(),
        choices: vec![Choice {
            index: 0,
            message: Message::assistant(content.map(str::to_string), function_call),
            finish_reason: Some("stop".into()),
        }],
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
        }),
    }
}

/// Plain text reply.
pub fn text_response(content: &str) -> ChatResponse {
    reply(Some(content), None)
}

/// Reply carrying only a function call.
pub fn call_response(name: &str, arguments: &str) -> ChatResponse {
    reply(None, Some((name, arguments)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_fixture_writes_and_resolves_paths() {
        let fixture = TestTempDir::new("fixture");
        let file = fixture.write_text("nested/file.txt", "hello");
        assert_eq!(fs::read_to_string(file).unwrap(), "hello");
    }

    // Verifies scripted replies come back in order and exhaustion is an error.
    #[tokio::test]
    async fn scripted_client_replays_in_order() {
        let client = ScriptedClient::new(vec![text_response("one"), call_response("f", "{}")]);
        let request = ChatRequest::new("m", vec![Message::user("hi")]);
        let first = client.chat(&request).await.unwrap().into_reply().unwrap();
        assert_eq!(first.reasoning.as_deref(), Some("one"));
        let second = client.chat(&request).await.unwrap().into_reply().unwrap();
        assert_eq!(second.function_call.unwrap().name, "f");
        assert!(client.chat(&request).await.is_err());
        assert_eq!(client.call_count(), 3);
    }
}
