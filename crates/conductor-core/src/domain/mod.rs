//! Domain model (IDs, kinds, records, the lifecycle state machine, errors).

pub mod errors;
pub mod ids;
pub mod kind;
pub mod status;
pub mod task;
pub mod worker;

pub use errors::OrchestratorError;
pub use ids::{ExecutionHandle, TaskId, WorkerId};
pub use kind::TaskKind;
pub use status::TaskStatus;
pub use task::{TaskRecord, TransitionUpdate};
pub use worker::{WorkerRecord, WorkerStatus};
