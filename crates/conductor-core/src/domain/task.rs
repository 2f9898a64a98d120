//! Task record: the authoritative state of one unit of submitted work.
//!
//! Design: following the single-source-of-truth pattern -- the store owns
//! `TaskRecord`s and all mutation goes through `apply_transition`, so the
//! invariants hold everywhere:
//! - exactly one of result/error is set, and only in Completed/Failed;
//! - assigned_worker/execution_handle are set iff the task was dispatched;
//! - created_at <= started_at <= completed_at when present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::OrchestratorError;
use super::ids::{ExecutionHandle, TaskId, WorkerId};
use super::kind::TaskKind;
use super::status::TaskStatus;

/// One unit of submitted inference work, tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,

    /// Opaque payload, immutable after creation.
    pub input: serde_json::Value,

    pub status: TaskStatus,

    /// Set exactly once, on the transition to Completed.
    pub result: Option<serde_json::Value>,

    /// Human-readable failure cause, set only on the transition to Failed.
    pub error: Option<String>,

    /// Back-reference (by ID) to the worker chosen at dispatch time.
    pub assigned_worker: Option<WorkerId>,

    /// Remote-tracking token from the transport; absent until dispatch.
    pub execution_handle: Option<ExecutionHandle>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Dispatch retries performed so far (the initial attempt is not a retry).
    pub retry_count: u32,
    pub max_retries: u32,

    /// A task still Pending past this age with no handle is failed.
    pub timeout_seconds: u64,
}

/// Fields a transition may set, applied in the same atomic step as the
/// status write.
#[derive(Debug, Clone, Default)]
pub struct TransitionUpdate {
    pub assigned_worker: Option<WorkerId>,
    pub execution_handle: Option<ExecutionHandle>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TransitionUpdate {
    /// No accompanying fields (e.g. cancellation).
    pub fn none() -> Self {
        Self::default()
    }

    /// Dispatch succeeded: record where the task went.
    pub fn dispatched(worker: WorkerId, handle: ExecutionHandle) -> Self {
        Self {
            assigned_worker: Some(worker),
            execution_handle: Some(handle),
            ..Self::default()
        }
    }

    pub fn completed(result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn failed(cause: impl Into<String>) -> Self {
        Self {
            error: Some(cause.into()),
            ..Self::default()
        }
    }
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        kind: TaskKind,
        input: serde_json::Value,
        max_retries: u32,
        timeout_seconds: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            input,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            assigned_worker: None,
            execution_handle: None,
            created_at,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries,
            timeout_seconds,
        }
    }

    /// Apply one transition, enforcing the state table and field invariants.
    ///
    /// On any error the record is left unchanged; the caller (the store)
    /// guarantees no observer sees a half-applied update.
    pub fn apply_transition(
        &mut self,
        next: TaskStatus,
        update: TransitionUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        if !self.status.can_transition_to(next) {
            return Err(OrchestratorError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let invalid = || OrchestratorError::InvalidTransition {
            from: self.status,
            to: next,
        };

        match next {
            TaskStatus::Running => {
                // Dispatch must tell us where the task went.
                if update.assigned_worker.is_none()
                    || update.execution_handle.is_none()
                    || update.result.is_some()
                    || update.error.is_some()
                {
                    return Err(invalid());
                }
            }
            TaskStatus::Completed => {
                if update.result.is_none() || update.error.is_some() {
                    return Err(invalid());
                }
            }
            TaskStatus::Failed => {
                if update.error.is_none() || update.result.is_some() {
                    return Err(invalid());
                }
            }
            TaskStatus::Cancelled => {
                if update.result.is_some() || update.error.is_some() {
                    return Err(invalid());
                }
            }
            TaskStatus::Pending => return Err(invalid()),
        }

        self.status = next;
        if let Some(worker) = update.assigned_worker {
            self.assigned_worker = Some(worker);
        }
        if let Some(handle) = update.execution_handle {
            self.execution_handle = Some(handle);
        }
        if update.result.is_some() {
            self.result = update.result;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        if next == TaskStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Age of the task at `now`, in whole seconds.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds()
    }
}
