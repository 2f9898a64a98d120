//! Orchestrator configuration.
//!
//! Everything here is injectable so tests can shrink timeouts and zero out
//! backoff; the defaults mirror a production deployment.

use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Dispatch retries allowed per task unless the request overrides it.
    pub default_max_retries: u32,

    /// Per-task timeout: a task still Pending past this with no handle fails.
    pub default_timeout: Duration,

    /// Upper bound on any single transport round-trip.
    pub dispatch_call_timeout: Duration,

    /// Period of the background reconciliation loop.
    pub reconcile_interval: Duration,

    /// A worker not seen within this window is considered offline.
    pub liveness_window: Duration,

    pub retry_policy: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            default_timeout: Duration::from_secs(300),
            dispatch_call_timeout: Duration::from_secs(30),
            reconcile_interval: Duration::from_secs(5),
            liveness_window: Duration::from_secs(60),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Tight timeouts and no backoff, for tests.
    pub fn for_tests() -> Self {
        Self {
            default_max_retries: 3,
            default_timeout: Duration::from_secs(300),
            dispatch_call_timeout: Duration::from_millis(200),
            reconcile_interval: Duration::from_millis(10),
            liveness_window: Duration::from_secs(60),
            retry_policy: RetryPolicy::immediate(),
        }
    }
}
