//! Per-job orchestration pipeline.
//!
//! Five strict phases: validate the request, generate and validate the
//! scenario, fan out mesh submissions, generate the script bundle, and
//! assemble the result document. Any failure in any phase collapses into
//! exactly one FAILED terminal state with an error document. Mesh failures
//! are the one exception: they ride along as sentinel handles inside a
//! COMPLETED result.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::llm::LlmGateway;
use crate::mesh::{error_sentinel, MeshErrorKind, MeshSubmitter};
use crate::store::ResultStore;
use crate::types::{CreationRequest, JobStatus, ModelHandle, Scenario, GAME_MANAGER_NAME};
use crate::validate::{validate_request, validate_scenario};

/// Pipeline phase failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Phase 1: the request failed semantic validation.
    #[error("request validation failed: {0}")]
    RequestRejected(String),
    /// Phase 2: the scenario LLM call or extraction failed.
    #[error("scenario generation failed: {0}")]
    ScenarioFailed(String),
    /// Phase 2: the scenario violated an invariant.
    #[error("scenario validation failed: {0}")]
    ScenarioRejected(String),
    /// Phase 4: the script LLM call or bundle extraction failed.
    #[error("script generation failed: {0}")]
    ScriptsFailed(String),
    /// Phase 5: the result document could not be built.
    #[error("result assembly failed: {0}")]
    AssemblyFailed(String),
}

/// Seam between the queue manager and the pipeline; tests substitute stubs.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run one job to its terminal state. Must not panic and must not
    /// return before the store holds a terminal state for `ruid`.
    async fn run(&self, ruid: &str, request: CreationRequest);
}

/// The per-job orchestration pipeline.
pub struct Pipeline {
    config: Arc<ServerConfig>,
    llm: Arc<LlmGateway>,
    mesh: Arc<dyn MeshSubmitter>,
    store: Arc<ResultStore>,
}

impl Pipeline {
    /// Wire the pipeline to its collaborators.
    pub fn new(
        config: Arc<ServerConfig>,
        llm: Arc<LlmGateway>,
        mesh: Arc<dyn MeshSubmitter>,
        store: Arc<ResultStore>,
    ) -> Self {
        Self {
            config,
            llm,
            mesh,
            store,
        }
    }

    /// Run phases 1–5 and return the COMPLETED result document.
    async fn execute(
        &self,
        ruid: &str,
        request: &CreationRequest,
    ) -> Result<serde_json::Value, PipelineError> {
        // === PHASE 1: VALIDATE REQUEST ===
        info!(ruid = %ruid, "phase 1: validating request");
        validate_request(request).map_err(|e| PipelineError::RequestRejected(e.to_string()))?;

        // === PHASE 2: SCENARIO ===
        info!(ruid = %ruid, "phase 2: generating scenario");
        let request_data = scenario_request_data(request);
        let scenario = self
            .llm
            .generate_scenario(&self.config.prompts.scenario, &request_data)
            .await
            .map_err(|e| PipelineError::ScenarioFailed(e.to_string()))?;
        validate_scenario(&scenario)
            .map_err(|e| PipelineError::ScenarioRejected(e.to_string()))?;

        // === PHASE 3: MESH FAN-OUT ===
        let models = self.submit_models(ruid, &scenario).await;

        // === PHASE 4: SCRIPTS ===
        info!(ruid = %ruid, "phase 4: generating scripts");
        let scenario_json = serde_json::to_value(&scenario)
            .map_err(|e| PipelineError::AssemblyFailed(e.to_string()))?;
        let scripts = self
            .llm
            .generate_scripts(&self.config.prompts.unified_scripts, &scenario_json)
            .await
            .map_err(|e| PipelineError::ScriptsFailed(e.to_string()))?;
        if !scripts.contains_key(GAME_MANAGER_NAME) {
            warn!(ruid = %ruid, "script bundle has no GameManager entry");
        }

        // === PHASE 5: ASSEMBLE ===
        info!(
            ruid = %ruid,
            scripts = scripts.len(),
            models = models.len(),
            "phase 5: assembling result"
        );
        Ok(json!({
            "ruid": ruid,
            "uuid": request.user_id,
            "theme": request.theme,
            "success": true,
            "scenario": scenario_json,
            "scripts": scripts,
            "models": models,
            "timestamp": Utc::now().timestamp_millis(),
        }))
    }

    /// Phase 3: one mesh submission per `interactive_object`, in scenario
    /// order. Sentinel handles are kept verbatim; nothing here fails the job.
    async fn submit_models(&self, ruid: &str, scenario: &Scenario) -> Vec<ModelHandle> {
        let free_modeling = scenario.scenario_data.is_free_modeling;
        let mut handles = Vec::new();
        for (index, object) in scenario.interactive_objects().enumerate() {
            let prompt = if free_modeling {
                object.simple_visual_description.as_deref()
            } else {
                object.visual_description.as_deref()
            };
            let tracking_id = match prompt {
                Some(prompt) if !prompt.trim().is_empty() => {
                    self.mesh.submit_model(prompt, &object.name, index).await
                }
                _ => {
                    // Validated scenarios always carry the prompt field.
                    warn!(ruid = %ruid, object = %object.name, "no mesh prompt available");
                    error_sentinel(MeshErrorKind::Local)
                }
            };
            handles.push(ModelHandle {
                object_name: object.name.clone(),
                tracking_id,
            });
        }
        info!(ruid = %ruid, submitted = handles.len(), "phase 3: mesh fan-out complete");
        handles
    }
}

#[async_trait]
impl JobRunner for Pipeline {
    async fn run(&self, ruid: &str, request: CreationRequest) {
        match self.execute(ruid, &request).await {
            Ok(document) => {
                if let Err(e) = self
                    .store
                    .store_final(ruid, document, JobStatus::Completed)
                    .await
                {
                    error!(ruid = %ruid, error = %e, "failed to store COMPLETED result");
                } else {
                    info!(ruid = %ruid, "job completed");
                }
            }
            Err(e) => {
                warn!(ruid = %ruid, error = %e, "job failed");
                let document = failure_document(ruid, &request.user_id, &e.to_string());
                if let Err(se) = self
                    .store
                    .store_final(ruid, document, JobStatus::Failed)
                    .await
                {
                    error!(ruid = %ruid, error = %se, "failed to store FAILED result");
                }
            }
        }
    }
}

/// User-content JSON handed to the scenario LLM call.
fn scenario_request_data(request: &CreationRequest) -> serde_json::Value {
    json!({
        "theme": request.theme,
        "keywords": request.keywords,
        "difficulty": request.resolved_difficulty().to_string(),
        "roomPrefab": request.room_prefab,
        "existingObjects": request.existing(),
        "isFreeModeling": request.is_free_modeling,
    })
}

/// Error document stored on any phase failure.
fn failure_document(ruid: &str, user_id: &str, error: &str) -> serde_json::Value {
    json!({
        "ruid": ruid,
        "uuid": user_id,
        "success": false,
        "error": error,
        "timestamp": Utc::now().timestamp_millis(),
    })
}

// ── Tests ───────────────────────────────────────────────────────
