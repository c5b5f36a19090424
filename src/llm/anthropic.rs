//! Anthropic messages API provider.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::OnceCell;

use super::{check_http_response, CompletionRequest, LlmError, TextCompletion};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Per-call connect/read timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Key and pooled HTTP client, built on first use.
#[derive(Debug)]
struct ReadyClient {
    api_key: String,
    http: reqwest::Client,
}

/// Anthropic `/v1/messages` provider.
///
/// The underlying client is constructed lazily exactly once; concurrent
/// first use races safely through the cell and `ANTHROPIC_KEY` is read at
/// that point, so a missing key fails the calling job rather than startup.
#[derive(Debug)]
pub struct AnthropicProvider {
    base_url: String,
    api_key_override: Option<String>,
    ready: OnceCell<ReadyClient>,
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicProvider {
    /// Create a provider against the production endpoint, keyed from the
    /// environment at first use.
    pub fn new() -> Self {
        Self {
            base_url: ANTHROPIC_API_BASE.to_owned(),
            api_key_override: None,
            ready: OnceCell::new(),
        }
    }

    /// Create a provider against a custom endpoint with an explicit key
    /// (integration tests).
    pub fn with_endpoint(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key_override: Some(api_key.into()),
            ready: OnceCell::new(),
        }
    }

    async fn ready(&self) -> Result<&ReadyClient, LlmError> {
        self.ready
            .get_or_try_init(|| async {
                let api_key = match &self.api_key_override {
                    Some(key) => key.clone(),
                    None => std::env::var("ANTHROPIC_KEY").map_err(|_| LlmError::MissingApiKey)?,
                };
                let http = reqwest::Client::builder()
                    .timeout(REQUEST_TIMEOUT)
                    .connect_timeout(REQUEST_TIMEOUT)
                    .build()?;
                Ok(ReadyClient { api_key, http })
            })
            .await
    }
}

#[async_trait::async_trait]
impl TextCompletion for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let client = self.ready().await?;

        let body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": request.system,
            "messages": [{
                "role": "user",
                "content": request.user_content,
            }],
        });

        let response = client
            .http
            .post(&self.base_url)
            .header("x-api-key", &client.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let payload = check_http_response(response).await?;

        let parsed: Value =
            serde_json::from_str(&payload).map_err(|e| LlmError::Parse(e.to_string()))?;

        first_text_block(&parsed)
    }
}

/// The text field of the first content block.
fn first_text_block(value: &Value) -> Result<String, LlmError> {
    let Some(blocks) = value.get("content").and_then(Value::as_array) else {
        return Err(LlmError::Parse("missing content array".to_owned()));
    };
    let first = blocks.first().ok_or(LlmError::EmptyResponse)?;
    let text = first
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::Parse("first content block has no text".to_owned()))?;
    Ok(text.to_owned())
}

// ── Tests ───────────────────────────────────────────────────────
