//! TaskStore port: the authoritative record of every task.
//!
//! The store is the single serialization point per task: implementations
//! guarantee at-most-one in-flight transition per task ID, while transitions
//! on different IDs do not block each other. `transition` is the only status
//! mutator and applies the state table atomically -- no observer ever sees a
//! half-applied update.
//!
//! The in-memory implementation lives in `store::memory`; a durable one can
//! be slotted in behind the same trait without touching the core's contract.

use async_trait::async_trait;

use crate::domain::{OrchestratorError, TaskId, TaskKind, TaskRecord, TaskStatus, TransitionUpdate};

/// Optional filters for `list`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub kind: Option<TaskKind>,
}

/// Offset/limit pagination.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// One page of task records plus the total match count (pre-pagination).
#[derive(Debug, Clone)]
pub struct TaskPage {
    pub items: Vec<TaskRecord>,
    pub total: usize,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a freshly created record. Always succeeds for a new ID; a
    /// duplicate ID is a `Conflict` and leaves the existing record untouched.
    async fn create(&self, task: TaskRecord) -> Result<TaskRecord, OrchestratorError>;

    async fn get(&self, id: TaskId) -> Result<TaskRecord, OrchestratorError>;

    /// Pure read: filter, order by created_at descending, paginate.
    async fn list(
        &self,
        filter: TaskFilter,
        page: Pagination,
    ) -> Result<TaskPage, OrchestratorError>;

    /// The only status mutator. Enforces the transition table; terminal
    /// fields (result/error/completed_at) land in the same atomic step.
    async fn transition(
        &self,
        id: TaskId,
        next: TaskStatus,
        update: TransitionUpdate,
    ) -> Result<TaskRecord, OrchestratorError>;

    /// Bump retry bookkeeping on a still-Pending task; returns the new count.
    /// Not a `transition` because the status does not change.
    async fn record_retry(&self, id: TaskId) -> Result<u32, OrchestratorError>;

    /// Remove a terminal task. `Conflict` for Pending/Running tasks, which
    /// would otherwise orphan a remote execution.
    async fn delete(&self, id: TaskId) -> Result<(), OrchestratorError>;

    /// Every record, for metrics aggregation and reconciliation sweeps.
    async fn all(&self) -> Result<Vec<TaskRecord>, OrchestratorError>;
}
