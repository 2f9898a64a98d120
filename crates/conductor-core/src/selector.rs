//! Worker selection: greedy least-loaded with deterministic tie-breaks.
//!
//! Not globally optimal, but O(workers) and stable: repeated calls with an
//! unchanged snapshot return the same worker, and ties go to the lowest
//! worker ID so equally-loaded workers do not oscillate.

use crate::domain::{OrchestratorError, TaskKind, WorkerId, WorkerRecord};

/// Pick the best worker for `kind` from a registry snapshot.
///
/// Eligible workers are Online and advertise the capability; among those the
/// least loaded wins, ties broken by lowest ID.
pub fn select_worker(
    snapshot: &[WorkerRecord],
    kind: TaskKind,
) -> Result<WorkerId, OrchestratorError> {
    snapshot
        .iter()
        .filter(|w| w.is_online() && w.supports(kind))
        .min_by(|a, b| a.load().cmp(&b.load()).then_with(|| a.id.cmp(&b.id)))
        .map(|w| w.id.clone())
        .ok_or(OrchestratorError::NoWorkerAvailable(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkerStatus;
    use chrono::Utc;

    fn worker(id: &str, kinds: &[TaskKind], load: u32, status: WorkerStatus) -> WorkerRecord {
        WorkerRecord {
            id: WorkerId::new(id),
            capabilities: kinds.to_vec(),
            active_count: load,
            scheduled_count: 0,
            reserved_count: 0,
            last_seen_at: Utc::now(),
            status,
        }
    }

    #[test]
    fn picks_least_loaded() {
        let snapshot = vec![
            worker("w1", &[TaskKind::TextGeneration], 4, WorkerStatus::Online),
            worker("w2", &[TaskKind::TextGeneration], 1, WorkerStatus::Online),
        ];
        let picked = select_worker(&snapshot, TaskKind::TextGeneration).unwrap();
        assert_eq!(picked, WorkerId::new("w2"));
    }

    #[test]
    fn ties_break_to_lowest_id_deterministically() {
        let snapshot = vec![
            worker("w3", &[TaskKind::TextGeneration], 5, WorkerStatus::Online),
            worker("w2", &[TaskKind::TextGeneration], 2, WorkerStatus::Online),
            worker("w1", &[TaskKind::TextGeneration], 2, WorkerStatus::Online),
        ];
        for _ in 0..10 {
            let picked = select_worker(&snapshot, TaskKind::TextGeneration).unwrap();
            assert_eq!(picked, WorkerId::new("w1"));
        }
    }

    #[test]
    fn skips_offline_and_incapable_workers() {
        let snapshot = vec![
            worker("w1", &[TaskKind::TextGeneration], 0, WorkerStatus::Offline),
            worker("w2", &[TaskKind::ImageGeneration], 0, WorkerStatus::Online),
            worker("w3", &[TaskKind::TextGeneration], 9, WorkerStatus::Online),
        ];
        let picked = select_worker(&snapshot, TaskKind::TextGeneration).unwrap();
        assert_eq!(picked, WorkerId::new("w3"));
    }

    #[test]
    fn unknown_status_is_not_eligible() {
        let snapshot = vec![worker(
            "w1",
            &[TaskKind::TextGeneration],
            0,
            WorkerStatus::Unknown,
        )];
        let err = select_worker(&snapshot, TaskKind::TextGeneration).unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::NoWorkerAvailable(TaskKind::TextGeneration)
        );
    }

    #[test]
    fn empty_snapshot_reports_no_worker() {
        let err = select_worker(&[], TaskKind::SpeechSynthesis).unwrap_err();
        assert!(matches!(err, OrchestratorError::NoWorkerAvailable(_)));
    }
}
