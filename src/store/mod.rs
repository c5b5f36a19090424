//! In-memory result store mapping job ids to lifecycle state.
//!
//! The store is the only cross-job shared mutable state in the server; its
//! API is the synchronization boundary. Writers hold the lock only for the
//! map operation itself (no I/O happens under it) and readers always see
//! either the prior snapshot or the updated one, never a torn state.

use std::collections::HashMap;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use crate::types::{JobState, JobStatus};

/// Errors returned by result-store operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// `register` was called with an id that already exists.
    #[error("job already registered: {0}")]
    AlreadyRegistered(String),
    /// The id is not present in the store.
    #[error("unknown job: {0}")]
    NotFound(String),
    /// The requested status change would move the lifecycle backwards.
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        /// Status currently held.
        from: JobStatus,
        /// Status that was requested.
        to: JobStatus,
    },
    /// `store_final` was called with a non-terminal status.
    #[error("{0} is not a terminal status")]
    NotTerminal(JobStatus),
}

/// Map from job id to [`JobState`] with monotonic transitions.
#[derive(Debug, Default)]
pub struct ResultStore {
    jobs: RwLock<HashMap<String, JobState>>,
}

impl ResultStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new job in QUEUED state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyRegistered`] if the id is present; the
    /// existing entry is left untouched.
    pub async fn register(&self, ruid: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(ruid) {
            return Err(StoreError::AlreadyRegistered(ruid.to_owned()));
        }
        jobs.insert(
            ruid.to_owned(),
            JobState {
                status: JobStatus::Queued,
                result: None,
            },
        );
        Ok(())
    }

    /// Advance a job's status without attaching a result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown ids and
    /// [`StoreError::IllegalTransition`] when the change would not move the
    /// lifecycle forward.
    pub async fn update(&self, ruid: &str, status: JobStatus) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let state = jobs
            .get_mut(ruid)
            .ok_or_else(|| StoreError::NotFound(ruid.to_owned()))?;
        if !state.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                from: state.status,
                to: status,
            });
        }
        state.status = status;
        Ok(())
    }

    /// Attach a terminal result document and move the job to `status`.
    ///
    /// The write is atomic with respect to readers: a concurrent `get`
    /// observes either the pre-terminal state or the terminal state with
    /// its document, never a terminal state without one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotTerminal`] if `status` is not COMPLETED or
    /// FAILED, [`StoreError::NotFound`] for unknown ids, and
    /// [`StoreError::IllegalTransition`] if the job is already terminal.
    pub async fn store_final(
        &self,
        ruid: &str,
        result: serde_json::Value,
        status: JobStatus,
    ) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::NotTerminal(status));
        }
        let mut jobs = self.jobs.write().await;
        let state = jobs
            .get_mut(ruid)
            .ok_or_else(|| StoreError::NotFound(ruid.to_owned()))?;
        if !state.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                from: state.status,
                to: status,
            });
        }
        state.status = status;
        state.result = Some(result);
        Ok(())
    }

    /// Snapshot of a job, or `None` when absent.
    pub async fn get(&self, ruid: &str) -> Option<JobState> {
        self.jobs.read().await.get(ruid).cloned()
    }

    /// Remove a job. Intended to be called once, after a terminal state has
    /// been served; removing an unknown id is a no-op.
    pub async fn delete(&self, ruid: &str) {
        self.jobs.write().await.remove(ruid);
    }

    /// Mark every non-terminal job FAILED with a shutdown document.
    ///
    /// Used only when the queue manager force-exits workers; returns the
    /// number of jobs swept.
    pub async fn fail_incomplete(&self, error: &str) -> usize {
        let mut jobs = self.jobs.write().await;
        let mut swept = 0usize;
        for (ruid, state) in jobs.iter_mut() {
            if state.status.is_terminal() {
                continue;
            }
            warn!(ruid = %ruid, from = %state.status, "sweeping unfinished job to FAILED");
            state.status = JobStatus::Failed;
            state.result = Some(serde_json::json!({
                "ruid": ruid,
                "uuid": "",
                "success": false,
                "error": error,
                "timestamp": Utc::now().timestamp_millis(),
            }));
            swept = swept.saturating_add(1);
        }
        swept
    }

    /// Number of entries currently held (terminal or not).
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

// ── Tests ───────────────────────────────────────────────────────
