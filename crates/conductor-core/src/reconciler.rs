//! Status reconciler: pulls remote execution state and applies it to the
//! local authoritative record.
//!
//! Reconciliation rules:
//! - terminal tasks are skipped outright, so a late remote result can never
//!   resurrect a cancelled task (the store's transition table backs this up);
//! - SUCCEEDED -> Completed, FAILED -> Failed; remote Pending/Running leave
//!   the record untouched;
//! - a poll error bumps a counter and moves on -- one failed poll is not a
//!   task failure;
//! - a task stuck Pending past its timeout with no dispatch handle is failed
//!   with a worker-unavailable cause.
//!
//! The background loop runs on a watch-channel shutdown signal so teardown is
//! deterministic, and every pass is also callable synchronously for tests and
//! for read-triggered reconciliation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{OrchestratorError, TaskId, TaskRecord, TaskStatus, TransitionUpdate};
use crate::gateway::DispatchGateway;
use crate::ports::{Clock, RemoteState, TaskStore};
use crate::registry::WorkerRegistry;

pub struct Reconciler {
    store: Arc<dyn TaskStore>,
    gateway: Arc<DispatchGateway>,
    registry: Arc<WorkerRegistry>,
    clock: Arc<dyn Clock>,
    poll_errors: AtomicU64,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        gateway: Arc<DispatchGateway>,
        registry: Arc<WorkerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            registry,
            clock,
            poll_errors: AtomicU64::new(0),
        }
    }

    /// Transient poll failures observed so far.
    pub fn poll_error_count(&self) -> u64 {
        self.poll_errors.load(Ordering::Relaxed)
    }

    /// Reconcile a single task against its remote state; returns the record
    /// as of after the pass.
    pub async fn reconcile_task(&self, id: TaskId) -> Result<TaskRecord, OrchestratorError> {
        let task = self.store.get(id).await?;
        if task.status.is_terminal() {
            return Ok(task);
        }

        if let Some(handle) = &task.execution_handle {
            let remote = match self.gateway.poll_status(handle).await {
                Ok(remote) => remote,
                Err(err) => {
                    // Transient: leave the task alone, count it, move on.
                    self.poll_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(task_id = %id, error = %err, "status poll failed");
                    return Ok(task);
                }
            };

            let (next, update) = match remote {
                RemoteState::Succeeded(result) => {
                    (TaskStatus::Completed, TransitionUpdate::completed(result))
                }
                RemoteState::Failed(error) => (TaskStatus::Failed, TransitionUpdate::failed(error)),
                RemoteState::Pending | RemoteState::Running => return Ok(task),
            };

            return match self.store.transition(id, next, update).await {
                Ok(updated) => {
                    info!(task_id = %id, status = %updated.status, "task reconciled");
                    Ok(updated)
                }
                // Lost a race with a concurrent terminal write (e.g. cancel).
                // The terminal state is authoritative; discard our result.
                Err(OrchestratorError::InvalidTransition { .. }) => {
                    debug!(task_id = %id, "reconcile result discarded, task already terminal");
                    self.store.get(id).await
                }
                Err(err) => Err(err),
            };
        }

        // No handle: dispatch never succeeded. Give up past the timeout.
        if task.status == TaskStatus::Pending
            && task.age_seconds(self.clock.now()) > task.timeout_seconds as i64
        {
            let cause = format!(
                "worker unavailable: dispatch timed out after {}s",
                task.timeout_seconds
            );
            warn!(task_id = %id, "pending task timed out");
            return match self
                .store
                .transition(id, TaskStatus::Failed, TransitionUpdate::failed(cause))
                .await
            {
                Ok(updated) => Ok(updated),
                Err(OrchestratorError::InvalidTransition { .. }) => self.store.get(id).await,
                Err(err) => Err(err),
            };
        }

        Ok(task)
    }

    /// One full pass: refresh the worker view, then reconcile every
    /// non-terminal task. Per-task errors are logged and do not stop the sweep.
    pub async fn reconcile_all(&self) {
        if let Err(err) = self.registry.refresh().await {
            warn!(error = %err, "registry refresh failed, keeping previous snapshot");
        }

        let tasks = match self.store.all().await {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(error = %err, "task sweep failed");
                return;
            }
        };

        for task in tasks {
            if task.status.is_terminal() {
                continue;
            }
            if let Err(err) = self.reconcile_task(task.id).await {
                warn!(task_id = %task.id, error = %err, "reconciliation failed");
            }
        }
    }

    /// Run `reconcile_all` on a fixed interval until shutdown is requested.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> ReconcilerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(interval) => self.reconcile_all().await,
                }
            }
        });

        ReconcilerHandle { shutdown_tx, join }
    }
}

/// Handle to the background reconciliation loop.
pub struct ReconcilerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Request shutdown; the loop exits before its next pass.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}
