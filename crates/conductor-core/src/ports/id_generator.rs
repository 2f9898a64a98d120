//! IdGenerator port: task ID allocation behind a trait, so tests can pin it.

use std::sync::Arc;

use ulid::Ulid;

use crate::domain::TaskId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn task_id(&self) -> TaskId;
}

/// ULID-based generator: IDs sort by creation time and need no coordination.
///
/// Timestamps come from the injected clock, so a `FixedClock` yields IDs with
/// a deterministic time component.
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl IdGenerator for UlidGenerator {
    fn task_id(&self) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        TaskId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
