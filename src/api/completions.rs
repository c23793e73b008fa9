//! `/chat/completions` protocol request helper.

use crate::api::parse_retry_after_secs;
use crate::error::ApiError;
use crate::types::{ChatRequest, ChatResponse};
use tracing::debug;

/// Send one `/chat/completions` request and parse the chat response payload.
pub(crate) async fn request(
    http: &reqwest::Client,
    base_url: &str,
    request: &ChatRequest,
    bearer: Option<&str>,
) -> Result<ChatResponse, ApiError> {
    let url = format!("{base_url}/chat/completions");
    debug!(
        url = %url,
        messages = request.messages.len(),
        functions = request.functions.as_ref().map_or(0, Vec::len),
        "sending chat request"
    );
    let builder = http.post(&url).json(request);
    let builder = match bearer {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    };

    let response = builder.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<ChatResponse>().await?);
    }
    let retry_after = parse_retry_after_secs(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::status(status.as_u16(), body, retry_after))
}
