//! Dispatch gateway: the transport with bounded patience.
//!
//! Every transport call is a remote round-trip and may block; the gateway
//! wraps each in a timeout. An elapsed timeout is a transport failure
//! (`Unreachable`), never a task failure -- retry policy lives with the
//! caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::{ExecutionHandle, OrchestratorError, TaskRecord, WorkerId};
use crate::ports::{RemoteState, RevokeAck, Transport};

pub struct DispatchGateway {
    transport: Arc<dyn Transport>,
    call_timeout: Duration,
}

impl DispatchGateway {
    pub fn new(transport: Arc<dyn Transport>, call_timeout: Duration) -> Self {
        Self {
            transport,
            call_timeout,
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, OrchestratorError>>,
    ) -> Result<T, OrchestratorError> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| {
                OrchestratorError::Unreachable(format!(
                    "transport call timed out after {:?}",
                    self.call_timeout
                ))
            })?
    }

    /// Submit the task payload to `worker`'s queue.
    pub async fn dispatch(
        &self,
        worker: &WorkerId,
        task: &TaskRecord,
    ) -> Result<ExecutionHandle, OrchestratorError> {
        let handle = self
            .bounded(self.transport.submit(worker, task.kind, &task.input))
            .await?;
        debug!(task_id = %task.id, worker_id = %worker, handle = %handle, "task submitted");
        Ok(handle)
    }

    /// Side-effect-free remote status read.
    pub async fn poll_status(
        &self,
        handle: &ExecutionHandle,
    ) -> Result<RemoteState, OrchestratorError> {
        self.bounded(self.transport.poll_status(handle)).await
    }

    /// Request cancellation; `force` means hard termination of an in-progress
    /// execution rather than a cooperative stop.
    pub async fn revoke(
        &self,
        handle: &ExecutionHandle,
        force: bool,
    ) -> Result<RevokeAck, OrchestratorError> {
        self.bounded(self.transport.revoke(handle, force)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, TaskKind};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::collections::HashMap;
    use ulid::Ulid;

    /// Transport that never answers, to exercise the timeout path.
    struct StuckTransport;

    #[async_trait]
    impl Transport for StuckTransport {
        async fn submit(
            &self,
            _worker: &WorkerId,
            _kind: TaskKind,
            _payload: &serde_json::Value,
        ) -> Result<ExecutionHandle, OrchestratorError> {
            std::future::pending().await
        }

        async fn poll_status(
            &self,
            _handle: &ExecutionHandle,
        ) -> Result<RemoteState, OrchestratorError> {
            std::future::pending().await
        }

        async fn revoke(
            &self,
            _handle: &ExecutionHandle,
            _force: bool,
        ) -> Result<RevokeAck, OrchestratorError> {
            std::future::pending().await
        }

        async fn list_workers(
            &self,
        ) -> Result<Vec<crate::ports::WorkerInfo>, OrchestratorError> {
            std::future::pending().await
        }

        async fn queue_depths(&self) -> Result<HashMap<String, usize>, OrchestratorError> {
            std::future::pending().await
        }
    }

    fn some_task() -> TaskRecord {
        TaskRecord::new(
            TaskId::from_ulid(Ulid::new()),
            TaskKind::TextGeneration,
            json!({}),
            0,
            300,
            DateTime::<Utc>::MIN_UTC,
        )
    }

    #[tokio::test]
    async fn stuck_dispatch_times_out_as_unreachable() {
        let gateway =
            DispatchGateway::new(Arc::new(StuckTransport), Duration::from_millis(20));
        let err = gateway
            .dispatch(&WorkerId::new("w1"), &some_task())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Unreachable(_)));
        assert!(err.is_transport_error());
    }

    #[tokio::test]
    async fn stuck_poll_times_out_as_unreachable() {
        let gateway =
            DispatchGateway::new(Arc::new(StuckTransport), Duration::from_millis(20));
        let err = gateway
            .poll_status(&ExecutionHandle::new("e1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Unreachable(_)));
    }
}
