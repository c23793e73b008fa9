//! Retrying client for OpenAI-compatible chat endpoints.
//!
//! Retry policy logic is delegated to `retry`; the wire request lives in
//! `super::completions`.

mod retry;

use super::{completions, ModelClient};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::types::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use retry::RetryPolicy;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Client for OpenAI-compatible model APIs.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry_policy: RetryPolicy,
}

impl ApiClient {
    /// Build a client from resolved API configuration.
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_policy(config, Duration::from_secs(config.timeout_secs), RetryPolicy::default())
    }

    fn with_policy(config: &ApiConfig, timeout: Duration, retry_policy: RetryPolicy) -> Self {
        let http = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(http) => http,
            Err(e) => {
                warn!(error = %e, "http client builder failed, using defaults");
                reqwest::Client::new()
            }
        };
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.trim().to_string(),
            retry_policy,
        }
    }

    /// Send a chat request, retrying transient failures.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        let bearer = (!self.api_key.is_empty()).then_some(self.api_key.as_str());
        let mut attempt: u32 = 0;
        loop {
            let err = match completions::request(&self.http, &self.base_url, request, bearer).await {
                Ok(response) => return Ok(response),
                Err(err) if !self.retry_policy.should_retry(&err, attempt) => return Err(err),
                Err(err) => err,
            };
            let delay = self.retry_policy.retry_delay_for(attempt, &err);
            warn!(
                model = %request.model,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "chat request failed, retrying"
            );
            attempt = attempt.saturating_add(1);
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl ModelClient for ApiClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        ApiClient::chat(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Verifies a stalled server surfaces as a timeout once attempts run out.
    #[tokio::test]
    async fn stalled_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let held = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(held);
        });

        let api = ApiConfig {
            base_url: format!("http://{addr}"),
            ..ApiConfig::default()
        };
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        let client = ApiClient::with_policy(&api, Duration::from_millis(50), policy);
        let err = client
            .chat(&ChatRequest::new("m", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, ApiError::Http(inner) if inner.is_timeout()),
            "expected timeout, got {err}"
        );
    }

    // Verifies a 429 with Retry-After is retried and the second answer parsed.
    #[tokio::test]
    async fn api_client_retries_transient_429_with_retry_after() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _server = tokio::spawn(async move {
            for attempt in 0..2 {
                let (mut stream, _) = listener.accept().await.expect("accept");
                let mut request_buf = [0u8; 4096];
                let _ = stream.read(&mut request_buf).await;
                if attempt == 0 {
                    let response = concat!(
                        "HTTP/1.1 429 Too Many Requests\r\n",
                        "Content-Type: application/json\r\n",
                        "Retry-After: 1\r\n",
                        "Content-Length: 16\r\n",
                        "Connection: close\r\n",
                        "\r\n",
                        "{\"error\":\"rate\"}"
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                } else {
                    let body = r#"{"id":"ok","choices":[{"index":0,"message":{"role":"assistant","content":null,"function_call":{"name":"list_files","arguments":"{}"}},"finish_reason":"function_call"}]}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                }
            }
        });

        let api = ApiConfig {
            base_url: format!("http://{addr}"),
            api_key: "test-key".to_string(),
            ..ApiConfig::default()
        };
        let retry_policy = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        };
        let client = ApiClient::with_policy(&api, Duration::from_secs(3), retry_policy);
        let request = ChatRequest::new("dummy-model", vec![Message::user("hello")]);
        let reply = client
            .chat(&request)
            .await
            .expect("retry should recover")
            .into_reply()
            .unwrap();
        assert_eq!(reply.function_call.unwrap().name, "list_files");
    }

    #[tokio::test]
    async fn api_client_surfaces_client_errors_without_retry() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut request_buf = [0u8; 4096];
            let _ = stream.read(&mut request_buf).await;
            let response = "HTTP/1.1 401 Unauthorized\r\nContent-Length: 3\r\nConnection: close\r\n\r\nbad";
            let _ = stream.write_all(response.as_bytes()).await;
        });
        let api = ApiConfig {
            base_url: format!("http://{addr}/"),
            ..ApiConfig::default()
        };
        let client = ApiClient::new(&api);
        let err = client
            .chat(&ChatRequest::new("m", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(401));
        assert!(err.to_string().contains("bad"));
    }
}
