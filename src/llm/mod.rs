//! LLM gateway: provider abstraction and the two generation operations.
//!
//! The [`TextCompletion`] trait is the seam between the pipeline and the
//! concrete provider ([`anthropic::AnthropicProvider`]); tests substitute
//! stubs. The gateway owns response handling: scenario JSON extraction,
//! script-bundle extraction, and mapping into the typed form. There are no
//! retries; any failure here is fatal to the calling job.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ModelParams;
use crate::types::{Scenario, ScriptBundle};

pub mod anthropic;
pub mod extract;

// ── Request / trait ─────────────────────────────────────────────

/// One provider round-trip.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt for the role.
    pub system: String,
    /// User content, a JSON document rendered to text.
    pub user_content: String,
    /// Provider model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Response token ceiling.
    pub max_tokens: u32,
}

/// Text-generation provider interface.
///
/// Implementations must be `Send + Sync`; the pipeline calls them from
/// worker tasks.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Request a completion and return the raw free-form text.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport, API, or parse failure.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

// ── Errors ──────────────────────────────────────────────────────

/// Errors surfaced by the LLM gateway. All are fatal to the job.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport failure.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Upstream responded with an error status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// Response did not match the expected provider schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// The provider returned no usable text.
    #[error("provider returned an empty response")]
    EmptyResponse,
    /// `ANTHROPIC_KEY` is unset at first use.
    #[error("ANTHROPIC_KEY is not set")]
    MissingApiKey,
    /// The scenario response held no parseable JSON object.
    #[error("scenario response is not a JSON object: {0}")]
    ScenarioJson(String),
    /// No fenced block yielded a usable script class.
    #[error("script response contained no usable class declarations")]
    EmptyScriptBundle,
}

// ── HTTP helpers ────────────────────────────────────────────────

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `LlmError::Request` on transport failure, `LlmError::HttpStatus`
/// on non-2xx (with the body sanitized).
pub async fn check_http_response(response: reqwest::Response) -> Result<String, LlmError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(LlmError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

/// Collapse, redact, and truncate an upstream error body before it reaches
/// logs or job failure documents.
pub fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"sk-ant-[A-Za-z0-9_\-]{10,}",
        r"sk-[A-Za-z0-9]{32,}",
        r"msy_[A-Za-z0-9_\-]{10,}",
        r"Bearer [A-Za-z0-9_\-\.]{10,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

// ── Gateway ─────────────────────────────────────────────────────

/// The two LLM operations the pipeline needs, with configuration applied.
pub struct LlmGateway {
    provider: Arc<dyn TextCompletion>,
    model: ModelParams,
}

impl LlmGateway {
    /// Create a gateway over `provider` with the configured model params.
    pub fn new(provider: Arc<dyn TextCompletion>, model: ModelParams) -> Self {
        Self { provider, model }
    }

    /// Generate and type-map a scenario.
    ///
    /// The response's first fenced block with an empty or `json` tag (or the
    /// whole response when unfenced) is parsed as a JSON object and mapped
    /// into [`Scenario`].
    ///
    /// # Errors
    ///
    /// Any provider, extraction, or mapping failure; all fatal to the job.
    pub async fn generate_scenario(
        &self,
        system_prompt: &str,
        request_data: &serde_json::Value,
    ) -> Result<Scenario, LlmError> {
        let text = self
            .provider
            .complete(CompletionRequest {
                system: system_prompt.to_owned(),
                user_content: request_data.to_string(),
                model: self.model.name.clone(),
                temperature: self.model.scenario_temperature,
                max_tokens: self.model.max_tokens,
            })
            .await?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let raw = extract::scenario_json(&text)?;
        serde_json::from_value(raw)
            .map_err(|e| LlmError::Parse(format!("scenario does not match expected shape: {e}")))
    }

    /// Generate the script bundle.
    ///
    /// Every fenced block with a `public [partial] class` declaration becomes
    /// one Base64-encoded entry; see [`extract::script_bundle`] for naming.
    ///
    /// # Errors
    ///
    /// Provider failures, or an empty resulting bundle.
    pub async fn generate_scripts(
        &self,
        system_prompt: &str,
        request_data: &serde_json::Value,
    ) -> Result<ScriptBundle, LlmError> {
        let text = self
            .provider
            .complete(CompletionRequest {
                system: system_prompt.to_owned(),
                user_content: request_data.to_string(),
                model: self.model.name.clone(),
                temperature: self.model.script_temperature,
                max_tokens: self.model.max_tokens,
            })
            .await?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        extract::script_bundle(&text)
    }
}

// ── Tests ───────────────────────────────────────────────────────
