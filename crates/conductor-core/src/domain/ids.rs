//! Domain identifiers (strongly-typed IDs).
//!
//! Tasks get ULID-based IDs: they sort by creation time and can be generated
//! without coordination. A phantom-typed `Id<T>` provides the shared
//! implementation so new ID kinds cannot be mixed up at compile time.
//!
//! Worker IDs are a different animal: they are stable names reported by the
//! transport (e.g. `gpu-worker-01`), so `WorkerId` wraps a string and keeps
//! its natural ordering -- selection tie-breaks rely on it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for ID kinds. Provides the Display prefix.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed ID.
///
/// `T` is PhantomData: zero runtime cost, compile-time type safety.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Marker type for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Identifier of a Task (one unit of submitted inference work).
pub type TaskId = Id<Task>;

/// Identifier of a Worker (a remote execution endpoint).
///
/// Reported by the transport, not generated here. Ordering is lexicographic,
/// which is what the selector uses for deterministic tie-breaks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque remote-tracking token returned by the transport on submit.
///
/// The core never inspects it; it is only handed back for status/revoke calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionHandle(String);

impl ExecutionHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_sort_by_generation_time() {
        let id1 = TaskId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn task_id_display_has_prefix() {
        let id = TaskId::from_ulid(Ulid::new());
        assert!(id.to_string().starts_with("task-"));
    }

    #[test]
    fn task_ids_roundtrip_through_serde() {
        let id = TaskId::from_ulid(Ulid::new());
        let serialized = serde_json::to_string(&id).unwrap();
        let deserialized: TaskId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn worker_ids_order_lexicographically() {
        let a = WorkerId::new("worker-a");
        let b = WorkerId::new("worker-b");
        assert!(a < b);
    }

    #[test]
    fn phantom_marker_costs_nothing() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
    }
}
