//! Orchestrator: the composition root.
//!
//! Wires selector + gateway + store + reconciler behind the public API
//! (create/get/list/cancel/delete plus metrics and worker views) and owns the
//! dispatch retry policy. All collaborators arrive injected, never as ambient
//! singletons, so tests run against fakes.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::domain::{
    OrchestratorError, TaskId, TaskKind, TaskRecord, TaskStatus, TransitionUpdate, WorkerRecord,
};
use crate::gateway::DispatchGateway;
use crate::ports::{
    Clock, IdGenerator, Pagination, RevokeAck, SystemClock, TaskFilter, TaskPage, TaskStore,
    Transport, UlidGenerator,
};
use crate::reconciler::{Reconciler, ReconcilerHandle};
use crate::registry::{WorkerHealth, WorkerRegistry};
use crate::selector::select_worker;
use crate::store::InMemoryTaskStore;

/// A new unit of work. `parameters` rides along inside the task input.
#[derive(Debug, Clone)]
pub struct CreateTaskRequest {
    pub kind: TaskKind,
    pub input: serde_json::Value,
    pub parameters: Option<serde_json::Value>,
    pub max_retries: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

impl CreateTaskRequest {
    pub fn new(kind: TaskKind, input: serde_json::Value) -> Self {
        Self {
            kind,
            input,
            parameters: None,
            max_retries: None,
            timeout_seconds: None,
        }
    }
}

/// Aggregation over the task store; success rate counts only tasks that ran
/// to a verdict (completed / (completed + failed)).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub success_rate: f64,
    pub avg_duration_secs: f64,
}

/// Builder wiring the orchestrator's collaborators; only the transport is
/// required, everything else has production defaults.
pub struct OrchestratorBuilder {
    transport: Arc<dyn Transport>,
    config: OrchestratorConfig,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn TaskStore>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl OrchestratorBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: OrchestratorConfig::default(),
            clock: Arc::new(SystemClock),
            store: None,
            ids: None,
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Orchestrator {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new(self.clock.clone())));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(self.clock.clone())));
        let gateway = Arc::new(DispatchGateway::new(
            self.transport.clone(),
            self.config.dispatch_call_timeout,
        ));
        let registry = Arc::new(WorkerRegistry::new(
            self.transport,
            self.clock.clone(),
            self.config.liveness_window,
        ));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            gateway.clone(),
            registry.clone(),
            self.clock.clone(),
        ));
        Orchestrator {
            store,
            registry,
            gateway,
            reconciler,
            drivers: Arc::new(RetryDrivers::new()),
            ids,
            clock: self.clock,
            config: self.config,
        }
    }
}

/// Tracks the background dispatch retry drivers: a shared shutdown signal
/// plus their join handles, so teardown is deterministic instead of dropping
/// a driver mid-backoff.
struct RetryDrivers {
    shutdown_tx: watch::Sender<bool>,
    joins: Mutex<Vec<JoinHandle<()>>>,
}

impl RetryDrivers {
    fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            joins: Mutex::new(Vec::new()),
        }
    }

    fn register(&self, join: JoinHandle<()>) {
        let mut joins = self.joins.lock().unwrap();
        joins.retain(|j| !j.is_finished());
        joins.push(join);
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn TaskStore>,
    registry: Arc<WorkerRegistry>,
    gateway: Arc<DispatchGateway>,
    reconciler: Arc<Reconciler>,
    drivers: Arc<RetryDrivers>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn builder(transport: Arc<dyn Transport>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(transport)
    }

    pub fn new(transport: Arc<dyn Transport>) -> Self {
        OrchestratorBuilder::new(transport).build()
    }

    /// Start the background reconciliation loop.
    pub fn spawn_reconciler(&self) -> ReconcilerHandle {
        self.reconciler
            .clone()
            .spawn(self.config.reconcile_interval)
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Stop the background retry drivers and wait for them to exit.
    ///
    /// A driver parked in its backoff sleep wakes and returns immediately; its
    /// task stays Pending and is failed later by the pending-timeout policy.
    pub async fn shutdown_retry_drivers(&self) {
        // ignore send error: there may be no drivers alive
        let _ = self.drivers.shutdown_tx.send(true);
        let joins: Vec<JoinHandle<()>> = std::mem::take(&mut *self.drivers.joins.lock().unwrap());
        for join in joins {
            let _ = join.await;
        }
    }

    /// Create a task and attempt to dispatch it.
    ///
    /// The first dispatch attempt runs inline, so the common case returns a
    /// Running record. On a transport failure with retries remaining, a
    /// background driver keeps attempting with backoff; once retries are
    /// exhausted the task is failed with the last cause preserved verbatim.
    pub async fn create_task(
        &self,
        req: CreateTaskRequest,
    ) -> Result<TaskRecord, OrchestratorError> {
        let input = match req.parameters {
            Some(parameters) => json!({"input": req.input, "parameters": parameters}),
            None => req.input,
        };
        let task = TaskRecord::new(
            self.ids.task_id(),
            req.kind,
            input,
            req.max_retries
                .unwrap_or(self.config.default_max_retries),
            req.timeout_seconds
                .unwrap_or(self.config.default_timeout.as_secs()),
            self.clock.now(),
        );
        let task = self.store.create(task).await?;
        info!(task_id = %task.id, kind = %task.kind, "task created");

        match self.try_dispatch(&task).await {
            Ok(running) => Ok(running),
            Err(err) if err.is_transport_error() => {
                warn!(task_id = %task.id, error = %err, "initial dispatch failed");
                if task.max_retries > 0 {
                    let this = self.clone();
                    let id = task.id;
                    let cause = err.to_string();
                    let shutdown_rx = self.drivers.shutdown_tx.subscribe();
                    let join =
                        tokio::spawn(async move { this.drive_retries(id, cause, shutdown_rx).await });
                    self.drivers.register(join);
                    self.store.get(task.id).await
                } else {
                    self.store
                        .transition(
                            task.id,
                            TaskStatus::Failed,
                            TransitionUpdate::failed(err.to_string()),
                        )
                        .await
                }
            }
            // Lost a race with a concurrent cancel; the record speaks for itself.
            Err(_) => self.store.get(task.id).await,
        }
    }

    /// One select + submit + transition round.
    async fn try_dispatch(&self, task: &TaskRecord) -> Result<TaskRecord, OrchestratorError> {
        self.registry.refresh().await?;
        let worker = select_worker(&self.registry.snapshot(), task.kind)?;
        let handle = self.gateway.dispatch(&worker, task).await?;

        match self
            .store
            .transition(
                task.id,
                TaskStatus::Running,
                TransitionUpdate::dispatched(worker.clone(), handle.clone()),
            )
            .await
        {
            Ok(updated) => {
                info!(task_id = %task.id, worker_id = %worker, "task dispatched");
                Ok(updated)
            }
            Err(err) => {
                // The task went terminal while we were submitting (e.g. a
                // concurrent cancel). Revoke so the remote side does not run
                // an execution nobody tracks.
                if let Err(revoke_err) = self.gateway.revoke(&handle, true).await {
                    warn!(task_id = %task.id, error = %revoke_err, "revoke of orphaned dispatch failed");
                }
                Err(err)
            }
        }
    }

    /// Background retry driver: re-attempts dispatch with backoff until it
    /// succeeds, the task leaves Pending, retries are exhausted, or shutdown
    /// is requested. A task abandoned by shutdown stays Pending and falls to
    /// the pending-timeout policy.
    async fn drive_retries(
        self,
        id: TaskId,
        mut last_cause: String,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown_rx.borrow() {
                debug!(task_id = %id, "retry driver stopped by shutdown");
                return;
            }
            let task = match self.store.get(id).await {
                Ok(task) if task.status == TaskStatus::Pending => task,
                _ => return, // deleted, dispatched elsewhere, or terminal
            };

            if task.retry_count >= task.max_retries {
                match self
                    .store
                    .transition(
                        id,
                        TaskStatus::Failed,
                        TransitionUpdate::failed(last_cause.clone()),
                    )
                    .await
                {
                    Ok(_) => warn!(task_id = %id, cause = %last_cause, "dispatch retries exhausted"),
                    Err(OrchestratorError::InvalidTransition { .. }) => {}
                    Err(err) => warn!(task_id = %id, error = %err, "failed to mark task failed"),
                }
                return;
            }

            let attempt = match self.store.record_retry(id).await {
                Ok(attempt) => attempt,
                Err(_) => return,
            };
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!(task_id = %id, "retry driver stopped by shutdown");
                    return;
                }
                _ = sleep(self.config.retry_policy.next_delay(attempt)) => {}
            }

            let task = match self.store.get(id).await {
                Ok(task) if task.status == TaskStatus::Pending => task,
                _ => return,
            };
            match self.try_dispatch(&task).await {
                Ok(_) => return,
                Err(err) if err.is_transport_error() => {
                    debug!(task_id = %id, attempt, error = %err, "dispatch retry failed");
                    last_cause = err.to_string();
                }
                Err(_) => return,
            }
        }
    }

    /// Fetch a task; non-terminal tasks get one synchronous reconciliation
    /// pass first, so reads are never staler than one worker round-trip.
    pub async fn get_task(&self, id: TaskId) -> Result<TaskRecord, OrchestratorError> {
        let task = self.store.get(id).await?;
        if task.status.is_terminal() {
            return Ok(task);
        }
        self.reconciler.reconcile_task(id).await
    }

    /// Pure read over the store.
    pub async fn list_tasks(
        &self,
        filter: TaskFilter,
        page: Pagination,
    ) -> Result<TaskPage, OrchestratorError> {
        self.store.list(filter, page).await
    }

    /// Cancel a non-terminal task.
    ///
    /// The remote revoke is best-effort; the local cancellation record is
    /// authoritative either way, and from here on the store will never report
    /// anything but Cancelled for this ID.
    pub async fn cancel_task(&self, id: TaskId) -> Result<TaskRecord, OrchestratorError> {
        let task = self.store.get(id).await?;
        if task.status.is_terminal() {
            return Err(OrchestratorError::Conflict {
                status: task.status,
            });
        }

        if let Some(handle) = &task.execution_handle {
            match self.gateway.revoke(handle, true).await {
                Ok(RevokeAck::Revoked) => {
                    info!(task_id = %id, "remote execution revoked")
                }
                Ok(RevokeAck::AlreadyTerminal) => {
                    debug!(task_id = %id, "remote side already finished")
                }
                Err(err) => {
                    warn!(task_id = %id, error = %err, "revoke failed, cancelling locally anyway")
                }
            }
        }

        match self
            .store
            .transition(id, TaskStatus::Cancelled, TransitionUpdate::none())
            .await
        {
            Ok(cancelled) => {
                info!(task_id = %id, "task cancelled");
                Ok(cancelled)
            }
            // Went terminal in the meantime: report it as a conflict, like a
            // cancel that arrived late in the first place.
            Err(OrchestratorError::InvalidTransition { .. }) => {
                let current = self.store.get(id).await?;
                Err(OrchestratorError::Conflict {
                    status: current.status,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Remove a terminal task. Conflict for Pending/Running.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), OrchestratorError> {
        self.store.delete(id).await?;
        info!(task_id = %id, "task deleted");
        Ok(())
    }

    /// Aggregate task counts and success rate.
    pub async fn metrics(&self) -> Result<TaskMetrics, OrchestratorError> {
        let tasks = self.store.all().await?;
        let mut metrics = TaskMetrics {
            total: tasks.len(),
            ..TaskMetrics::default()
        };

        let mut duration_sum = 0.0;
        for task in &tasks {
            match task.status {
                TaskStatus::Pending => metrics.pending += 1,
                TaskStatus::Running => metrics.running += 1,
                TaskStatus::Completed => metrics.completed += 1,
                TaskStatus::Failed => metrics.failed += 1,
                TaskStatus::Cancelled => metrics.cancelled += 1,
            }
            if task.status == TaskStatus::Completed
                && let Some(completed_at) = task.completed_at
            {
                duration_sum += (completed_at - task.created_at).num_milliseconds() as f64 / 1000.0;
            }
        }

        let decided = metrics.completed + metrics.failed;
        if decided > 0 {
            metrics.success_rate = metrics.completed as f64 / decided as f64;
        }
        if metrics.completed > 0 {
            metrics.avg_duration_secs = duration_sum / metrics.completed as f64;
        }
        Ok(metrics)
    }

    /// Pool health: worker counts plus broker queue backlog.
    pub async fn worker_health(&self) -> Result<WorkerHealth, OrchestratorError> {
        self.refresh_best_effort().await;
        self.registry.health().await
    }

    /// Per-worker load counters from the latest registry snapshot.
    pub async fn worker_stats(&self) -> Vec<WorkerRecord> {
        self.refresh_best_effort().await;
        self.registry.snapshot()
    }

    async fn refresh_best_effort(&self) {
        if let Err(err) = self.registry.refresh().await {
            warn!(error = %err, "registry refresh failed, serving last snapshot");
        }
    }
}
