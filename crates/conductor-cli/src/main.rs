//! Demo driver: a scripted worker pool, a few tasks through their whole
//! lifecycle, and the metrics/health views at the end.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;
use tracing::info;

use conductor_core::impls::{InMemoryTransport, WorkerScript};
use conductor_core::ports::SystemClock;
use conductor_core::{
    CreateTaskRequest, Orchestrator, OrchestratorConfig, Pagination, RetryPolicy, TaskFilter,
    TaskKind, TaskStatus,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // (A) A scripted worker pool: one that completes text generation after a
    // couple of polls, one that always fails image generation, and nobody at
    // all for speech synthesis.
    let clock = Arc::new(SystemClock);
    let transport = Arc::new(InMemoryTransport::new(clock.clone()));
    transport.add_worker_with_script(
        "gpu-text-1",
        &[TaskKind::TextGeneration],
        WorkerScript::SucceedAfterPolls {
            polls: 2,
            result: json!({"text": "a poem about queues"}),
        },
    );
    transport.add_worker_with_script(
        "gpu-image-1",
        &[TaskKind::ImageGeneration],
        WorkerScript::FailWith("CUDA out of memory".into()),
    );

    let config = OrchestratorConfig {
        reconcile_interval: Duration::from_millis(200),
        retry_policy: RetryPolicy {
            base_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        },
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::builder(transport.clone())
        .clock(clock)
        .config(config)
        .build();

    // (B) Background reconciliation.
    let reconciler = orchestrator.spawn_reconciler();

    // (C) Submit one task of each flavor.
    let text = orchestrator
        .create_task(CreateTaskRequest {
            parameters: Some(json!({"temperature": 0.7})),
            ..CreateTaskRequest::new(TaskKind::TextGeneration, json!({"prompt": "write a poem"}))
        })
        .await
        .expect("create text task");
    info!(task_id = %text.id, status = %text.status, "submitted");

    let image = orchestrator
        .create_task(CreateTaskRequest::new(
            TaskKind::ImageGeneration,
            json!({"prompt": "a lighthouse at dusk"}),
        ))
        .await
        .expect("create image task");
    info!(task_id = %image.id, status = %image.status, "submitted");

    // No speech worker exists, so this one retries and then fails.
    let speech = orchestrator
        .create_task(CreateTaskRequest {
            max_retries: Some(2),
            ..CreateTaskRequest::new(TaskKind::SpeechSynthesis, json!({"text": "hello"}))
        })
        .await
        .expect("create speech task");
    info!(task_id = %speech.id, status = %speech.status, "submitted");

    // (D) Wait for every task to settle.
    let ids = [text.id, image.id, speech.id];
    loop {
        let mut all_terminal = true;
        for id in ids {
            let task = orchestrator.get_task(id).await.expect("task exists");
            if !task.status.is_terminal() {
                all_terminal = false;
            }
        }
        if all_terminal {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }

    for id in ids {
        let task = orchestrator.get_task(id).await.expect("task exists");
        println!(
            "{} [{}] status={} worker={:?} result={:?} error={:?}",
            task.id, task.kind, task.status, task.assigned_worker, task.result, task.error
        );
    }

    // (E) Aggregate views.
    let failed = orchestrator
        .list_tasks(
            TaskFilter {
                status: Some(TaskStatus::Failed),
                ..TaskFilter::default()
            },
            Pagination::default(),
        )
        .await
        .expect("list failed tasks");
    println!("failed tasks: {}/{}", failed.items.len(), failed.total);

    let metrics = orchestrator.metrics().await.expect("metrics");
    println!(
        "metrics: total={} completed={} failed={} cancelled={} success_rate={:.2} avg_duration={:.1}s",
        metrics.total,
        metrics.completed,
        metrics.failed,
        metrics.cancelled,
        metrics.success_rate,
        metrics.avg_duration_secs
    );

    let health = orchestrator.worker_health().await.expect("health");
    println!(
        "workers: {}/{} online, queue depths {:?}",
        health.online_workers, health.total_workers, health.queue_depths
    );
    for worker in orchestrator.worker_stats().await {
        println!(
            "  {} status={:?} load={} capabilities={:?}",
            worker.id,
            worker.status,
            worker.load(),
            worker.capabilities
        );
    }

    // (F) Clean shutdown of the background loops.
    orchestrator.shutdown_retry_drivers().await;
    reconciler.shutdown_and_join().await;
}
