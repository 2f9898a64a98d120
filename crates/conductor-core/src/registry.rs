//! Worker registry: the current view of known workers and their load.
//!
//! Refresh replaces the snapshot wholesale -- a single worker's fields are
//! never stitched together from two different refresh cycles, so stale and
//! fresh counters cannot interleave. Readers take the snapshot under a read
//! lock and never observe a half-written one.
//!
//! Liveness: a worker absent from one refresh is Unknown (its counters may be
//! stale), absent from two consecutive refreshes it is Offline and excluded
//! from selection until it reappears. A worker whose reported last_seen_at is
//! older than the liveness window is Offline even if the transport still
//! lists it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{OrchestratorError, WorkerId, WorkerRecord, WorkerStatus};
use crate::ports::{Clock, Transport};

/// Misses before an absent worker is considered gone.
const OFFLINE_AFTER_MISSES: u32 = 2;

#[derive(Debug, Clone)]
struct TrackedWorker {
    record: WorkerRecord,
    missed_refreshes: u32,
}

/// Aggregate health view for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub total_workers: usize,
    pub online_workers: usize,
    pub queue_depths: HashMap<String, usize>,
}

pub struct WorkerRegistry {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    liveness_window: Duration,
    workers: RwLock<HashMap<WorkerId, TrackedWorker>>,
}

impl WorkerRegistry {
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        liveness_window: Duration,
    ) -> Self {
        Self {
            transport,
            clock,
            liveness_window,
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Pull the current worker view from the transport and replace the
    /// snapshot. On transport error the previous snapshot stays untouched.
    pub async fn refresh(&self) -> Result<(), OrchestratorError> {
        let infos = self.transport.list_workers().await?;
        let now = self.clock.now();
        let window = chrono::Duration::from_std(self.liveness_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));

        let mut next: HashMap<WorkerId, TrackedWorker> = HashMap::with_capacity(infos.len());
        for info in infos {
            let status = if now - info.last_seen_at <= window {
                WorkerStatus::Online
            } else {
                WorkerStatus::Offline
            };
            next.insert(
                info.id.clone(),
                TrackedWorker {
                    record: WorkerRecord {
                        id: info.id,
                        capabilities: info.capabilities,
                        active_count: info.active_count,
                        scheduled_count: info.scheduled_count,
                        reserved_count: info.reserved_count,
                        last_seen_at: info.last_seen_at,
                        status,
                    },
                    missed_refreshes: 0,
                },
            );
        }

        // Carry over workers that dropped out of this cycle, with their miss
        // count bumped; their counters are kept as-is but no longer trusted.
        {
            let prior = self.workers.read().unwrap();
            for (id, tracked) in prior.iter() {
                if next.contains_key(id) {
                    continue;
                }
                let missed = tracked.missed_refreshes + 1;
                let mut record = tracked.record.clone();
                record.status = if missed >= OFFLINE_AFTER_MISSES {
                    WorkerStatus::Offline
                } else {
                    WorkerStatus::Unknown
                };
                if record.status == WorkerStatus::Offline
                    && tracked.record.status != WorkerStatus::Offline
                {
                    warn!(worker_id = %id, missed, "worker marked offline");
                }
                next.insert(
                    id.clone(),
                    TrackedWorker {
                        record,
                        missed_refreshes: missed,
                    },
                );
            }
        }

        let online = next.values().filter(|t| t.record.is_online()).count();
        debug!(total = next.len(), online, "worker registry refreshed");

        *self.workers.write().unwrap() = next;
        Ok(())
    }

    /// Current view, sorted by worker ID. Callers never mutate it.
    pub fn snapshot(&self) -> Vec<WorkerRecord> {
        let workers = self.workers.read().unwrap();
        let mut records: Vec<WorkerRecord> =
            workers.values().map(|t| t.record.clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Pool health plus broker queue backlog.
    pub async fn health(&self) -> Result<WorkerHealth, OrchestratorError> {
        let queue_depths = self.transport.queue_depths().await?;
        let snapshot = self.snapshot();
        Ok(WorkerHealth {
            total_workers: snapshot.len(),
            online_workers: snapshot.iter().filter(|w| w.is_online()).count(),
            queue_depths,
        })
    }
}
