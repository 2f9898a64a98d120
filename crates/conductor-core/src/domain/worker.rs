//! Worker record: the registry's view of one remote execution endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::WorkerId;
use super::kind::TaskKind;

/// Derived liveness status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Seen in the latest refresh, within the liveness window.
    Online,
    /// Absent from two consecutive refreshes, or last seen too long ago.
    Offline,
    /// Absent from exactly one refresh; counters may be stale.
    Unknown,
}

/// One remote execution endpoint and its reported load.
///
/// Records are replaced wholesale on each registry refresh, never mutated
/// field-by-field, so stale and fresh counters never interleave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub capabilities: Vec<TaskKind>,
    pub active_count: u32,
    pub scheduled_count: u32,
    pub reserved_count: u32,
    pub last_seen_at: DateTime<Utc>,
    pub status: WorkerStatus,
}

impl WorkerRecord {
    /// Load metric used by least-loaded selection.
    pub fn load(&self) -> u32 {
        self.active_count + self.scheduled_count + self.reserved_count
    }

    pub fn supports(&self, kind: TaskKind) -> bool {
        self.capabilities.contains(&kind)
    }

    pub fn is_online(&self) -> bool {
        self.status == WorkerStatus::Online
    }
}
