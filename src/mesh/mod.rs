//! Mesh generation gateway: fire-and-track submissions to the Meshy
//! text-to-3D API.
//!
//! The gateway never fails a job. Every failure mode maps to a sentinel
//! tracking id of shape `error-<kind>-<uuid>` that travels through the
//! pipeline verbatim and lands in the COMPLETED result's `models` list.
//! Completion of the 3D job itself is the caller's concern; the server
//! only hands back tracking ids.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::sanitize_http_error_body;

const MESHY_API_BASE: &str = "https://api.meshy.ai/v2/text-to-3d";

/// Negative prompt sent with every preview submission.
const NEGATIVE_PROMPT: &str = "low quality, low resolution, low poly, ugly";

/// Per-call connect/read timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ── Sentinels ───────────────────────────────────────────────────

/// Failure classes encoded into sentinel tracking ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshErrorKind {
    /// Preview submission returned an unreadable body.
    Preview,
    /// Refine-stage failure (legacy flow; not produced by this gateway).
    Refine,
    /// Provider answered but the response carried no resource id.
    NoId,
    /// Local precondition failure or provider error status.
    Local,
    /// Transport-level failure (connect, timeout, send).
    Exception,
}

impl std::fmt::Display for MeshErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preview => f.write_str("preview"),
            Self::Refine => f.write_str("refine"),
            Self::NoId => f.write_str("no-id"),
            Self::Local => f.write_str("local"),
            Self::Exception => f.write_str("exception"),
        }
    }
}

/// Build a sentinel tracking id for a failed submission.
pub fn error_sentinel(kind: MeshErrorKind) -> String {
    format!("error-{kind}-{}", Uuid::new_v4())
}

/// Whether a tracking id is a failure sentinel rather than a provider id.
pub fn is_error_sentinel(tracking_id: &str) -> bool {
    tracking_id.starts_with("error-")
}

// ── Trait ───────────────────────────────────────────────────────

/// Text-to-3D submission interface; the pipeline's seam for tests.
#[async_trait]
pub trait MeshSubmitter: Send + Sync {
    /// Submit one model generation and return its tracking id.
    ///
    /// `key_index` selects the bearer key (`key_index mod N`); the pipeline
    /// passes the object's ordinal so keys rotate round-robin within a job.
    /// Never errors: failures come back as sentinel ids.
    async fn submit_model(&self, prompt: &str, object_name: &str, key_index: usize) -> String;
}

// ── Gateway ─────────────────────────────────────────────────────

/// Meshy v2 client with rotating bearer keys.
#[derive(Debug)]
pub struct MeshGateway {
    base_url: String,
    keys: Vec<String>,
    http: reqwest::Client,
    submissions: AtomicU64,
}

impl MeshGateway {
    /// Create a gateway against the production endpoint.
    ///
    /// # Errors
    ///
    /// Returns the underlying error if the HTTP client cannot be built.
    pub fn new(keys: Vec<String>) -> Result<Self, reqwest::Error> {
        Self::with_base_url(MESHY_API_BASE, keys)
    }

    /// Create a gateway against a custom endpoint (integration tests).
    ///
    /// # Errors
    ///
    /// Returns the underlying error if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: impl Into<String>,
        keys: Vec<String>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            keys,
            http,
            submissions: AtomicU64::new(0),
        })
    }

    /// Total submissions attempted since construction.
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MeshSubmitter for MeshGateway {
    async fn submit_model(&self, prompt: &str, object_name: &str, key_index: usize) -> String {
        self.submissions.fetch_add(1, Ordering::Relaxed);

        let Some(key) = self
            .keys
            .get(key_index.checked_rem(self.keys.len()).unwrap_or(0))
        else {
            warn!(object = %object_name, "no mesh key configured -- returning error handle");
            return error_sentinel(MeshErrorKind::Local);
        };

        let body = json!({
            "prompt": prompt,
            "negative_prompt": NEGATIVE_PROMPT,
            "mode": "preview",
        });

        let response = match self
            .http
            .post(&self.base_url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(object = %object_name, error = %e, "mesh submit transport failure");
                return error_sentinel(MeshErrorKind::Exception);
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(object = %object_name, error = %e, "mesh response body unreadable");
                return error_sentinel(MeshErrorKind::Exception);
            }
        };

        if !status.is_success() {
            warn!(
                object = %object_name,
                status = status.as_u16(),
                body = %sanitize_http_error_body(&text),
                "mesh submit rejected by provider"
            );
            return error_sentinel(MeshErrorKind::Local);
        }

        let parsed: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                warn!(object = %object_name, error = %e, "mesh response is not JSON");
                return error_sentinel(MeshErrorKind::Preview);
            }
        };

        match parsed.get("resource_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => {
                info!(object = %object_name, tracking_id = %id, "mesh job submitted");
                id.to_owned()
            }
            _ => {
                warn!(object = %object_name, "mesh response carried no resource_id");
                error_sentinel(MeshErrorKind::NoId)
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
