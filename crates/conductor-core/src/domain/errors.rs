//! Error taxonomy for the orchestration core.
//!
//! Two families matter to callers:
//! - client errors (NotFound, Conflict, InvalidKind): the request was wrong
//!   for the current state, retrying the same call will not help;
//! - transport errors (NoWorkerAvailable, DispatchFailed, Unreachable):
//!   the system could not complete the request right now, retried internally
//!   with backoff and only surfaced once retries are exhausted.
//!
//! InvalidTransition is neither: it flags a state-machine violation, which is
//! a caller or reconciler bug. It is logged loudly and rejected, never
//! silently applied.

use thiserror::Error;

use super::ids::TaskId;
use super::kind::TaskKind;
use super::status::TaskStatus;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("operation not allowed while task is {status}")]
    Conflict { status: TaskStatus },

    #[error("no worker available for kind {0}")]
    NoWorkerAvailable(TaskKind),

    #[error("dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("transport unreachable: {0}")]
    Unreachable(String),

    #[error("unknown task kind: {0}")]
    InvalidKind(String),
}

impl OrchestratorError {
    /// "Your request was invalid" (4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OrchestratorError::NotFound(_)
                | OrchestratorError::Conflict { .. }
                | OrchestratorError::InvalidKind(_)
        )
    }

    /// Transport-level failure, retried with backoff before surfacing.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            OrchestratorError::NoWorkerAvailable(_)
                | OrchestratorError::DispatchFailed(_)
                | OrchestratorError::Unreachable(_)
        )
    }
}
