//! conductor-core
//!
//! Orchestration core for long-running inference tasks: a task lifecycle
//! state machine, worker selection over a live registry, dispatch with
//! bounded retries, and a reconciler that folds remote execution state back
//! into the local store.
//!
//! # Module layout
//! - **domain**: the model (ids, kind, status, task record, worker record, errors)
//! - **ports**: abstraction seams (Transport, TaskStore, Clock, IdGenerator)
//! - **store**: in-memory TaskStore implementation
//! - **registry / selector / gateway / reconciler**: the moving parts
//! - **orchestrator**: composition root and public API
//! - **impls**: scripted in-memory transport for development and tests

pub mod config;
pub mod domain;
pub mod gateway;
pub mod impls;
pub mod orchestrator;
pub mod ports;
pub mod reconciler;
pub mod registry;
pub mod retry;
pub mod selector;
pub mod store;

pub use config::OrchestratorConfig;
pub use domain::{
    ExecutionHandle, OrchestratorError, TaskId, TaskKind, TaskRecord, TaskStatus, WorkerId,
    WorkerRecord, WorkerStatus,
};
pub use orchestrator::{CreateTaskRequest, Orchestrator, OrchestratorBuilder, TaskMetrics};
pub use ports::{Pagination, TaskFilter, TaskPage};
pub use registry::WorkerHealth;
pub use retry::RetryPolicy;
