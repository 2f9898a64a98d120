//! In-memory transport: a scriptable fake broker for tests and the demo CLI.
//!
//! Workers here do not execute anything; each carries a script deciding what
//! its executions report when polled. Failure injection covers the submit,
//! poll and introspection paths so callers can exercise every transport
//! error branch.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ExecutionHandle, OrchestratorError, TaskKind, WorkerId};
use crate::ports::transport::{RemoteState, RevokeAck, Transport, WorkerInfo};
use crate::ports::Clock;

/// What an execution on this worker reports when polled.
#[derive(Debug, Clone)]
pub enum WorkerScript {
    /// Report Running for `polls` polls, then Succeeded with `result`.
    SucceedAfterPolls { polls: u32, result: serde_json::Value },
    /// Report Failed with this error on the first poll.
    FailWith(String),
    /// Report Pending forever.
    StayPending,
}

impl Default for WorkerScript {
    fn default() -> Self {
        WorkerScript::SucceedAfterPolls {
            polls: 0,
            result: serde_json::json!({"status": "ok"}),
        }
    }
}

#[derive(Debug, Clone)]
struct FakeWorker {
    capabilities: Vec<TaskKind>,
    active_count: u32,
    scheduled_count: u32,
    reserved_count: u32,
    last_seen_at: DateTime<Utc>,
    script: WorkerScript,
}

#[derive(Debug, Clone)]
struct Execution {
    script: WorkerScript,
    polls_remaining: u32,
    revoked: bool,
}

impl Execution {
    fn is_terminal(&self) -> bool {
        match self.script {
            WorkerScript::SucceedAfterPolls { .. } => self.polls_remaining == 0,
            WorkerScript::FailWith(_) => true,
            WorkerScript::StayPending => false,
        }
    }
}

#[derive(Default)]
struct Inner {
    workers: BTreeMap<WorkerId, FakeWorker>,
    executions: HashMap<ExecutionHandle, Execution>,
    next_handle: u64,
    fail_submits: u32,
    fail_polls: u32,
    fail_list_workers: u32,
    revokes: Vec<(ExecutionHandle, bool)>,
    submit_count: u64,
}

pub struct InMemoryTransport {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl InMemoryTransport {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register (or re-register) a worker with the default succeed script.
    pub fn add_worker(&self, id: &str, capabilities: &[TaskKind]) {
        self.add_worker_with_script(id, capabilities, WorkerScript::default());
    }

    pub fn add_worker_with_script(
        &self,
        id: &str,
        capabilities: &[TaskKind],
        script: WorkerScript,
    ) {
        let mut inner = self.inner.lock().unwrap();
        let last_seen_at = self.clock.now();
        inner.workers.insert(
            WorkerId::new(id),
            FakeWorker {
                capabilities: capabilities.to_vec(),
                active_count: 0,
                scheduled_count: 0,
                reserved_count: 0,
                last_seen_at,
                script,
            },
        );
    }

    pub fn set_worker_load(&self, id: &str, active: u32, scheduled: u32, reserved: u32) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(worker) = inner.workers.get_mut(&WorkerId::new(id)) {
            worker.active_count = active;
            worker.scheduled_count = scheduled;
            worker.reserved_count = reserved;
        }
    }

    pub fn remove_worker(&self, id: &str) {
        self.inner.lock().unwrap().workers.remove(&WorkerId::new(id));
    }

    pub fn fail_next_submits(&self, n: u32) {
        self.inner.lock().unwrap().fail_submits = n;
    }

    pub fn fail_next_polls(&self, n: u32) {
        self.inner.lock().unwrap().fail_polls = n;
    }

    pub fn fail_next_list_workers(&self) {
        self.inner.lock().unwrap().fail_list_workers = 1;
    }

    /// Revoke calls observed so far, as (handle, force) pairs.
    pub fn revokes(&self) -> Vec<(ExecutionHandle, bool)> {
        self.inner.lock().unwrap().revokes.clone()
    }

    pub fn submit_count(&self) -> u64 {
        self.inner.lock().unwrap().submit_count
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn submit(
        &self,
        worker: &WorkerId,
        kind: TaskKind,
        _payload: &serde_json::Value,
    ) -> Result<ExecutionHandle, OrchestratorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.submit_count += 1;

        if inner.fail_submits > 0 {
            inner.fail_submits -= 1;
            return Err(OrchestratorError::DispatchFailed(
                "injected submit failure".into(),
            ));
        }

        let script = {
            let fake = inner
                .workers
                .get_mut(worker)
                .ok_or_else(|| OrchestratorError::DispatchFailed(format!("unknown worker {worker}")))?;
            if !fake.capabilities.contains(&kind) {
                return Err(OrchestratorError::DispatchFailed(format!(
                    "worker {worker} rejects kind {kind}"
                )));
            }
            fake.active_count += 1;
            fake.script.clone()
        };

        inner.next_handle += 1;
        let handle = ExecutionHandle::new(format!("exec-{}", inner.next_handle));
        let polls_remaining = match &script {
            WorkerScript::SucceedAfterPolls { polls, .. } => *polls,
            _ => 0,
        };
        inner.executions.insert(
            handle.clone(),
            Execution {
                script,
                polls_remaining,
                revoked: false,
            },
        );
        Ok(handle)
    }

    async fn poll_status(
        &self,
        handle: &ExecutionHandle,
    ) -> Result<RemoteState, OrchestratorError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.fail_polls > 0 {
            inner.fail_polls -= 1;
            return Err(OrchestratorError::Unreachable(
                "injected poll failure".into(),
            ));
        }

        let execution = inner
            .executions
            .get_mut(handle)
            .ok_or_else(|| OrchestratorError::Unreachable(format!("unknown handle {handle}")))?;

        if execution.revoked {
            return Ok(RemoteState::Failed("revoked".into()));
        }

        match &execution.script {
            WorkerScript::SucceedAfterPolls { result, .. } => {
                if execution.polls_remaining == 0 {
                    Ok(RemoteState::Succeeded(result.clone()))
                } else {
                    execution.polls_remaining -= 1;
                    Ok(RemoteState::Running)
                }
            }
            WorkerScript::FailWith(error) => Ok(RemoteState::Failed(error.clone())),
            WorkerScript::StayPending => Ok(RemoteState::Pending),
        }
    }

    async fn revoke(
        &self,
        handle: &ExecutionHandle,
        force: bool,
    ) -> Result<RevokeAck, OrchestratorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.revokes.push((handle.clone(), force));

        let execution = inner
            .executions
            .get_mut(handle)
            .ok_or_else(|| OrchestratorError::Unreachable(format!("unknown handle {handle}")))?;

        if execution.is_terminal() {
            Ok(RevokeAck::AlreadyTerminal)
        } else {
            execution.revoked = true;
            Ok(RevokeAck::Revoked)
        }
    }

    async fn list_workers(&self) -> Result<Vec<WorkerInfo>, OrchestratorError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.fail_list_workers > 0 {
            inner.fail_list_workers -= 1;
            return Err(OrchestratorError::Unreachable(
                "injected introspection failure".into(),
            ));
        }

        Ok(inner
            .workers
            .iter()
            .map(|(id, w)| WorkerInfo {
                id: id.clone(),
                capabilities: w.capabilities.clone(),
                active_count: w.active_count,
                scheduled_count: w.scheduled_count,
                reserved_count: w.reserved_count,
                last_seen_at: w.last_seen_at,
            })
            .collect())
    }

    async fn queue_depths(&self) -> Result<HashMap<String, usize>, OrchestratorError> {
        let inner = self.inner.lock().unwrap();
        let backlog = inner
            .executions
            .values()
            .filter(|e| !e.is_terminal() && !e.revoked)
            .count();
        Ok(HashMap::from([("default".to_string(), backlog)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::SystemClock;
    use serde_json::json;

    fn transport() -> InMemoryTransport {
        InMemoryTransport::new(Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn submit_then_poll_follows_the_script() {
        let t = transport();
        t.add_worker_with_script(
            "w1",
            &[TaskKind::TextGeneration],
            WorkerScript::SucceedAfterPolls {
                polls: 1,
                result: json!({"text": "done"}),
            },
        );

        let handle = t
            .submit(&WorkerId::new("w1"), TaskKind::TextGeneration, &json!({}))
            .await
            .unwrap();

        assert_eq!(t.poll_status(&handle).await.unwrap(), RemoteState::Running);
        assert_eq!(
            t.poll_status(&handle).await.unwrap(),
            RemoteState::Succeeded(json!({"text": "done"}))
        );
        // Idempotent once terminal.
        assert_eq!(
            t.poll_status(&handle).await.unwrap(),
            RemoteState::Succeeded(json!({"text": "done"}))
        );
    }

    #[tokio::test]
    async fn submit_rejects_unsupported_kind() {
        let t = transport();
        t.add_worker("w1", &[TaskKind::TextGeneration]);

        let err = t
            .submit(&WorkerId::new("w1"), TaskKind::ImageGeneration, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DispatchFailed(_)));
    }

    #[tokio::test]
    async fn revoke_running_then_already_terminal() {
        let t = transport();
        t.add_worker_with_script(
            "w1",
            &[TaskKind::TextGeneration],
            WorkerScript::StayPending,
        );
        let running = t
            .submit(&WorkerId::new("w1"), TaskKind::TextGeneration, &json!({}))
            .await
            .unwrap();
        assert_eq!(t.revoke(&running, true).await.unwrap(), RevokeAck::Revoked);

        t.add_worker("w2", &[TaskKind::TextGeneration]);
        let finished = t
            .submit(&WorkerId::new("w2"), TaskKind::TextGeneration, &json!({}))
            .await
            .unwrap();
        assert_eq!(
            t.revoke(&finished, false).await.unwrap(),
            RevokeAck::AlreadyTerminal
        );

        assert_eq!(t.revokes().len(), 2);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let t = transport();
        t.add_worker("w1", &[TaskKind::TextGeneration]);

        t.fail_next_submits(1);
        let err = t
            .submit(&WorkerId::new("w1"), TaskKind::TextGeneration, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DispatchFailed(_)));

        // Next one goes through.
        t.submit(&WorkerId::new("w1"), TaskKind::TextGeneration, &json!({}))
            .await
            .unwrap();
    }
}
