//! Transport port: the message-broker / result-store capability.
//!
//! The core does not implement delivery guarantees, persistence or
//! acknowledgement; it assumes an at-least-once primitive supplied from
//! outside and builds task semantics on top. No ordering is guaranteed
//! between submit and status visibility -- a poll immediately after submit
//! may still read Pending.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ExecutionHandle, OrchestratorError, TaskKind, WorkerId};

/// Remote execution state as reported by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteState {
    Pending,
    Running,
    Succeeded(serde_json::Value),
    Failed(String),
}

impl RemoteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteState::Succeeded(_) | RemoteState::Failed(_))
    }
}

/// Outcome of a revoke request.
///
/// `AlreadyTerminal` is not an error: the remote side finished before the
/// revoke landed. The caller still reconciles local state on its own terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeAck {
    Revoked,
    AlreadyTerminal,
}

/// Raw per-worker introspection row from the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub capabilities: Vec<TaskKind>,
    pub active_count: u32,
    pub scheduled_count: u32,
    pub reserved_count: u32,
    pub last_seen_at: DateTime<Utc>,
}

/// The broker capability consumed by the core.
///
/// All methods involve a remote round-trip; the gateway wraps each call in a
/// bounded timeout, so implementations may block as long as the broker does.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a task payload to the chosen worker's queue.
    async fn submit(
        &self,
        worker: &WorkerId,
        kind: TaskKind,
        payload: &serde_json::Value,
    ) -> Result<ExecutionHandle, OrchestratorError>;

    /// Side-effect-free status read; safe to call repeatedly.
    async fn poll_status(
        &self,
        handle: &ExecutionHandle,
    ) -> Result<RemoteState, OrchestratorError>;

    /// Request cancellation. `force` asks for hard termination of an
    /// in-progress execution rather than a cooperative stop.
    async fn revoke(
        &self,
        handle: &ExecutionHandle,
        force: bool,
    ) -> Result<RevokeAck, OrchestratorError>;

    /// Current workers with capabilities, load counters and liveness.
    async fn list_workers(&self) -> Result<Vec<WorkerInfo>, OrchestratorError>;

    /// Queue name -> backlog length, for health reporting.
    async fn queue_depths(&self) -> Result<HashMap<String, usize>, OrchestratorError>;
}
