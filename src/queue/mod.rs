//! FIFO request queue with a fixed-size worker pool.
//!
//! Submission registers the job in the result store and enqueues it under
//! the caller's task; workers take items in FIFO order and drive the
//! pipeline. Metric counters are plain atomics, good enough for
//! monitoring but not required to be consistent across one another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::pipeline::JobRunner;
use crate::store::{ResultStore, StoreError};
use crate::types::{new_ruid, CreationRequest, JobStatus};

/// Default grace period for draining workers at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors surfaced to a submitter.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The queue no longer accepts work.
    #[error("queue is shut down")]
    ShutDown,
    /// Registration in the result store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Monitoring snapshot of the queue.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStatus {
    /// Jobs enqueued but not yet taken by a worker.
    pub queued: u64,
    /// Pipelines currently in flight.
    pub active: u64,
    /// Jobs that reached a terminal state (either kind).
    pub completed: u64,
    /// Worker pool size.
    #[serde(rename = "maxConcurrent")]
    pub max_concurrent: usize,
}

#[derive(Debug, Default)]
struct Metrics {
    queued: AtomicU64,
    active: AtomicU64,
    completed: AtomicU64,
}

type QueueItem = (String, CreationRequest);

/// Owner of the request FIFO and the worker pool.
pub struct QueueManager {
    tx: Mutex<Option<mpsc::UnboundedSender<QueueItem>>>,
    store: Arc<ResultStore>,
    metrics: Arc<Metrics>,
    max_concurrent: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl QueueManager {
    /// Spawn `worker_count` workers (at least one) over a fresh queue.
    pub fn start(
        worker_count: usize,
        runner: Arc<dyn JobRunner>,
        store: Arc<ResultStore>,
    ) -> Self {
        Self::start_with_timeout(worker_count, runner, store, DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// [`QueueManager::start`] with an explicit shutdown grace period.
    pub fn start_with_timeout(
        worker_count: usize,
        runner: Arc<dyn JobRunner>,
        store: Arc<ResultStore>,
        shutdown_timeout: Duration,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<QueueItem>();
        let rx = Arc::new(Mutex::new(rx));
        let metrics = Arc::new(Metrics::default());

        let workers = (0..worker_count)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let runner = Arc::clone(&runner);
                let store = Arc::clone(&store);
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    worker_loop(worker_id, rx, runner, store, metrics).await;
                })
            })
            .collect();

        info!(workers = worker_count, "queue manager started");

        Self {
            tx: Mutex::new(Some(tx)),
            store,
            metrics,
            max_concurrent: worker_count,
            workers: Mutex::new(workers),
            shutdown_timeout,
        }
    }

    /// Register and enqueue a request; returns the fresh ruid.
    ///
    /// The job is visible in the result store (QUEUED) before this returns.
    /// If the enqueue cannot happen the registration is rolled back.
    ///
    /// # Errors
    ///
    /// [`SubmitError::ShutDown`] after shutdown, or a store error from
    /// registration.
    pub async fn submit(&self, request: CreationRequest) -> Result<String, SubmitError> {
        let ruid = new_ruid();
        self.store.register(&ruid).await?;

        let sender = self.tx.lock().await.clone();
        let Some(sender) = sender else {
            self.store.delete(&ruid).await;
            return Err(SubmitError::ShutDown);
        };

        self.metrics.queued.fetch_add(1, Ordering::SeqCst);
        if sender.send((ruid.clone(), request)).is_err() {
            self.metrics.queued.fetch_sub(1, Ordering::SeqCst);
            self.store.delete(&ruid).await;
            return Err(SubmitError::ShutDown);
        }

        info!(ruid = %ruid, "job queued");
        Ok(ruid)
    }

    /// Current monitoring snapshot.
    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            queued: self.metrics.queued.load(Ordering::SeqCst),
            active: self.metrics.active.load(Ordering::SeqCst),
            completed: self.metrics.completed.load(Ordering::SeqCst),
            max_concurrent: self.max_concurrent,
        }
    }

    /// Stop accepting jobs, drain workers for the grace period, then abort
    /// stragglers and mark everything unfinished as FAILED.
    pub async fn shutdown(&self) {
        info!("queue manager shutting down");
        self.tx.lock().await.take();

        let mut workers = self.workers.lock().await;
        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            for handle in workers.iter_mut() {
                let _ = handle.await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("drain timed out; aborting in-flight workers");
            for handle in workers.iter() {
                handle.abort();
            }
        }
        workers.clear();

        let swept = self.store.fail_incomplete("server shutdown").await;
        if swept > 0 {
            warn!(swept, "unfinished jobs marked FAILED by shutdown");
        }
        info!("queue manager stopped");
    }
}

/// One worker: block on the queue, run the pipeline, keep the counters.
async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<QueueItem>>>,
    runner: Arc<dyn JobRunner>,
    store: Arc<ResultStore>,
    metrics: Arc<Metrics>,
) {
    loop {
        // The lock is held only while waiting; siblings queue up behind it
        // and take the next item as soon as this one is released.
        let item = { rx.lock().await.recv().await };
        let Some((ruid, request)) = item else {
            debug!(worker_id, "queue closed; worker exiting");
            break;
        };

        metrics.queued.fetch_sub(1, Ordering::SeqCst);
        metrics.active.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = store.update(&ruid, JobStatus::Processing).await {
            warn!(worker_id, ruid = %ruid, error = %e, "could not mark job PROCESSING");
        }
        debug!(worker_id, ruid = %ruid, "job taken");

        runner.run(&ruid, request).await;

        metrics.active.fetch_sub(1, Ordering::SeqCst);
        metrics.completed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Tests ───────────────────────────────────────────────────────
