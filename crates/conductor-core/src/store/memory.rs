//! In-memory task store.
//!
//! Locking layout: an outer `RwLock` guards the map structure, each record
//! sits behind its own `Mutex`. A transition locks exactly one record, so
//! there is at most one in-flight transition per task ID and transitions on
//! different IDs never block each other. No lock is held across an await.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::warn;

use crate::domain::{
    OrchestratorError, TaskId, TaskRecord, TaskStatus, TransitionUpdate,
};
use crate::ports::task_store::{Pagination, TaskFilter, TaskPage, TaskStore};
use crate::ports::Clock;

pub struct InMemoryTaskStore {
    clock: Arc<dyn Clock>,
    tasks: RwLock<HashMap<TaskId, Arc<Mutex<TaskRecord>>>>,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, id: TaskId) -> Result<Arc<Mutex<TaskRecord>>, OrchestratorError> {
        self.tasks
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(OrchestratorError::NotFound(id))
    }

    fn matches(task: &TaskRecord, filter: &TaskFilter) -> bool {
        if let Some(status) = filter.status
            && task.status != status
        {
            return false;
        }
        if let Some(kind) = filter.kind
            && task.kind != kind
        {
            return false;
        }
        true
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: TaskRecord) -> Result<TaskRecord, OrchestratorError> {
        let mut tasks = self.tasks.write().unwrap();
        match tasks.entry(task.id) {
            Entry::Occupied(existing) => {
                // An existing record is never overwritten; a duplicate ID is
                // a generator bug surfaced as a conflict with that record.
                let status = existing.get().lock().unwrap().status;
                warn!(task_id = %task.id, %status, "rejected duplicate task id");
                Err(OrchestratorError::Conflict { status })
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(task.clone())));
                Ok(task)
            }
        }
    }

    async fn get(&self, id: TaskId) -> Result<TaskRecord, OrchestratorError> {
        let entry = self.entry(id)?;
        let task = entry.lock().unwrap();
        Ok(task.clone())
    }

    async fn list(
        &self,
        filter: TaskFilter,
        page: Pagination,
    ) -> Result<TaskPage, OrchestratorError> {
        let entries: Vec<Arc<Mutex<TaskRecord>>> =
            self.tasks.read().unwrap().values().cloned().collect();

        let mut matching: Vec<TaskRecord> = entries
            .iter()
            .map(|e| e.lock().unwrap().clone())
            .filter(|t| Self::matches(t, &filter))
            .collect();

        // Newest first; ULIDs break ties between equal timestamps.
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();

        Ok(TaskPage { items, total })
    }

    async fn transition(
        &self,
        id: TaskId,
        next: TaskStatus,
        update: TransitionUpdate,
    ) -> Result<TaskRecord, OrchestratorError> {
        let entry = self.entry(id)?;
        let now = self.clock.now();

        let mut task = entry.lock().unwrap();
        let from = task.status;
        match task.apply_transition(next, update, now) {
            Ok(()) => Ok(task.clone()),
            Err(err) => {
                // A rejected transition is a caller or reconciler bug, or a
                // lost race with a terminal write. Either way: loud, unapplied.
                warn!(task_id = %id, %from, to = %next, "rejected invalid transition");
                Err(err)
            }
        }
    }

    async fn record_retry(&self, id: TaskId) -> Result<u32, OrchestratorError> {
        let entry = self.entry(id)?;
        let mut task = entry.lock().unwrap();
        if task.status != TaskStatus::Pending {
            return Err(OrchestratorError::Conflict {
                status: task.status,
            });
        }
        task.retry_count += 1;
        Ok(task.retry_count)
    }

    async fn delete(&self, id: TaskId) -> Result<(), OrchestratorError> {
        let mut tasks = self.tasks.write().unwrap();
        let entry = tasks.get(&id).ok_or(OrchestratorError::NotFound(id))?;
        let status = entry.lock().unwrap().status;
        if !status.is_terminal() {
            return Err(OrchestratorError::Conflict { status });
        }
        tasks.remove(&id);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<TaskRecord>, OrchestratorError> {
        let entries: Vec<Arc<Mutex<TaskRecord>>> =
            self.tasks.read().unwrap().values().cloned().collect();
        Ok(entries.iter().map(|e| e.lock().unwrap().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionHandle, TaskKind, WorkerId};
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use ulid::Ulid;

    fn fixtures() -> (Arc<FixedClock>, InMemoryTaskStore) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        let store = InMemoryTaskStore::new(clock.clone());
        (clock, store)
    }

    fn new_task(clock: &FixedClock, kind: TaskKind) -> TaskRecord {
        TaskRecord::new(
            TaskId::from_ulid(Ulid::new()),
            kind,
            json!({"prompt": "x"}),
            3,
            300,
            clock.now(),
        )
    }

    async fn running(store: &InMemoryTaskStore, clock: &FixedClock) -> TaskRecord {
        let task = new_task(clock, TaskKind::TextGeneration);
        store.create(task.clone()).await.unwrap();
        store
            .transition(
                task.id,
                TaskStatus::Running,
                TransitionUpdate::dispatched(WorkerId::new("w1"), ExecutionHandle::new("e1")),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_then_get() {
        let (clock, store) = fixtures();
        let task = new_task(&clock, TaskKind::TextGeneration);
        store.create(task.clone()).await.unwrap();

        let fetched = store.get(task.id).await.unwrap();
        assert_eq!(fetched, task);
    }

    #[tokio::test]
    async fn duplicate_id_conflicts_and_keeps_the_original() {
        let (clock, store) = fixtures();
        let original = new_task(&clock, TaskKind::TextGeneration);
        store.create(original.clone()).await.unwrap();

        let mut imposter = new_task(&clock, TaskKind::ImageGeneration);
        imposter.id = original.id;
        let err = store.create(imposter).await.unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Conflict {
                status: TaskStatus::Pending
            }
        );
        assert_eq!(store.get(original.id).await.unwrap(), original);
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let (_, store) = fixtures();
        let err = store.get(TaskId::from_ulid(Ulid::new())).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }

    #[tokio::test]
    async fn transition_stamps_clock_time() {
        let (clock, store) = fixtures();
        let t0 = clock.now();
        let task = running(&store, &clock).await;
        assert_eq!(task.started_at, Some(t0));

        clock.advance(Duration::seconds(7));
        let done = store
            .transition(
                task.id,
                TaskStatus::Completed,
                TransitionUpdate::completed(json!({"out": 1})),
            )
            .await
            .unwrap();
        assert_eq!(done.completed_at, Some(t0 + Duration::seconds(7)));
    }

    #[tokio::test]
    async fn invalid_transition_leaves_record_unchanged() {
        let (clock, store) = fixtures();
        let task = new_task(&clock, TaskKind::TextGeneration);
        store.create(task.clone()).await.unwrap();

        let err = store
            .transition(
                task.id,
                TaskStatus::Completed,
                TransitionUpdate::completed(json!({})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
        assert_eq!(store.get(task.id).await.unwrap(), task);
    }

    #[tokio::test]
    async fn terminal_reads_are_stable() {
        let (clock, store) = fixtures();
        let task = running(&store, &clock).await;
        store
            .transition(
                task.id,
                TaskStatus::Completed,
                TransitionUpdate::completed(json!({"out": "r"})),
            )
            .await
            .unwrap();

        let first = store.get(task.id).await.unwrap();
        let second = store.get(task.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.result, Some(json!({"out": "r"})));
        assert!(first.error.is_none());
    }

    #[tokio::test]
    async fn delete_refuses_non_terminal_tasks() {
        let (clock, store) = fixtures();

        let pending = new_task(&clock, TaskKind::TextGeneration);
        store.create(pending.clone()).await.unwrap();
        let err = store.delete(pending.id).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Conflict {
                status: TaskStatus::Pending
            }
        ));

        let run = running(&store, &clock).await;
        let err = store.delete(run.id).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Conflict {
                status: TaskStatus::Running
            }
        ));
    }

    #[tokio::test]
    async fn delete_terminal_task_then_get_is_not_found() {
        let (clock, store) = fixtures();
        let task = running(&store, &clock).await;
        store
            .transition(
                task.id,
                TaskStatus::Completed,
                TransitionUpdate::completed(json!({})),
            )
            .await
            .unwrap();

        store.delete(task.id).await.unwrap();
        let err = store.get(task.id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }

    #[tokio::test]
    async fn record_retry_counts_and_refuses_non_pending() {
        let (clock, store) = fixtures();
        let task = new_task(&clock, TaskKind::TextGeneration);
        store.create(task.clone()).await.unwrap();

        assert_eq!(store.record_retry(task.id).await.unwrap(), 1);
        assert_eq!(store.record_retry(task.id).await.unwrap(), 2);

        let run = running(&store, &clock).await;
        let err = store.record_retry(run.id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Conflict { .. }));
    }

    #[tokio::test]
    async fn list_filters_orders_and_paginates() {
        let (clock, store) = fixtures();

        let mut ids = Vec::new();
        for i in 0..5 {
            let kind = if i % 2 == 0 {
                TaskKind::TextGeneration
            } else {
                TaskKind::ImageGeneration
            };
            let task = new_task(&clock, kind);
            store.create(task.clone()).await.unwrap();
            ids.push(task.id);
            clock.advance(Duration::seconds(1));
        }

        // Newest first.
        let page = store
            .list(TaskFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items[0].id, ids[4]);
        assert_eq!(page.items[4].id, ids[0]);

        // Kind filter.
        let page = store
            .list(
                TaskFilter {
                    kind: Some(TaskKind::ImageGeneration),
                    ..TaskFilter::default()
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page.items.iter().all(|t| t.kind == TaskKind::ImageGeneration));

        // Pagination reports the full match count.
        let page = store
            .list(
                TaskFilter::default(),
                Pagination {
                    limit: 2,
                    offset: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, ids[2]);
    }

    #[tokio::test]
    async fn concurrent_transitions_on_one_task_serialize() {
        let (clock, store) = fixtures();
        let store = Arc::new(store);
        let task = running(&store, &clock).await;

        // Race a completion against a cancellation; exactly one must win.
        let s1 = store.clone();
        let s2 = store.clone();
        let id = task.id;
        let (a, b) = tokio::join!(
            tokio::spawn(async move {
                s1.transition(
                    id,
                    TaskStatus::Completed,
                    TransitionUpdate::completed(json!({})),
                )
                .await
            }),
            tokio::spawn(async move {
                s2.transition(id, TaskStatus::Cancelled, TransitionUpdate::none())
                    .await
            }),
        );
        let results = [a.unwrap(), b.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);

        let final_task = store.get(id).await.unwrap();
        assert!(final_task.status.is_terminal());
    }
}
