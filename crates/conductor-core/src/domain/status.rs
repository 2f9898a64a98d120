//! Task lifecycle state machine.
//!
//! State transitions:
//! - Pending -> Running (dispatch succeeded)
//! - Pending -> Failed (no worker available / retries exhausted / timeout)
//! - Pending -> Cancelled
//! - Running -> Completed | Failed | Cancelled
//! - Completed / Failed / Cancelled are terminal: nothing leaves them.
//!
//! Design note: the table lives here as a pure predicate; the store is the
//! only place that applies it, so every observer sees the same rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a task in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet dispatched to a worker.
    #[default]
    Pending,

    /// Dispatched; a worker holds the execution.
    Running,

    /// Finished successfully; `result` is set.
    Completed,

    /// Finished unsuccessfully; `error` carries the cause.
    Failed,

    /// Cancelled locally; authoritative even if the remote side kept going.
    Cancelled,
}

impl TaskStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// The transition table. Everything not listed is an invalid transition.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
