use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use rand::Rng;
use serde_json::json;
use worker_pool::prelude::*;
use worker_pool::telemetry::{init_telemetry, TelemetryConfig};

const DEFAULT_TASKS: usize = 24;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "worker_pool=debug,pool_demo=info")
    // - WORKER_POOL_*: Pool configuration
    // - DEMO_TASKS: Number of tasks to submit
    // - DEMO_FAILURE_RATE: Probability that a simulated task fails (0.0 - 1.0)
    let mut telemetry_config = TelemetryConfig::from_env();
    if telemetry_config.service_name == "worker-pool" {
        telemetry_config.service_name = "pool-demo".to_string();
    }
    if telemetry_config.log_filter.is_none() {
        telemetry_config.log_filter = Some("worker_pool=debug,pool_demo=info".to_string());
    }
    init_telemetry(telemetry_config).context("Failed to initialize telemetry")?;

    let task_count = env_or("DEMO_TASKS", DEFAULT_TASKS);
    let failure_rate = env_or("DEMO_FAILURE_RATE", 0.2f64).clamp(0.0, 1.0);
    let config = WorkerPoolConfig::from_env();

    tracing::info!(
        workers = config.worker_count,
        task_timeout_ms = config.task_timeout.as_millis() as u64,
        max_retries = config.max_retries,
        task_count,
        failure_rate,
        "Starting pool demo"
    );

    let factory = HandlerWorkerFactory::new();
    factory.register_handler("simulate", move |request| async move {
        // Decide up front so the RNG is not held across the sleep
        let (delay_ms, fail) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(20..200u64), rng.gen_bool(failure_rate))
        };
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        if fail {
            return Err(format!("simulated failure after {delay_ms}ms"));
        }
        Ok(json!({
            "input": request.payload.data,
            "elapsed_ms": delay_ms,
        }))
    });

    let pool: WorkerPool<_> =
        WorkerPool::new(factory, config).context("Failed to create worker pool")?;
    subscribe_logging(&pool);
    pool.warm_up().context("Failed to start workers")?;

    let handles: Vec<_> = (0..task_count)
        .map(|i| {
            let priority = match i % 3 {
                0 => Priority::High,
                1 => Priority::Medium,
                _ => Priority::Low,
            };
            pool.submit("simulate", json!({ "index": i, "priority": priority }), priority)
        })
        .collect();

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for result in join_all(handles).await {
        match result {
            Ok(success) => {
                succeeded += 1;
                tracing::debug!(task_id = %success.task_id, data = %success.data, "Result");
            }
            Err(e) => {
                failed += 1;
                tracing::debug!(error = %e, "Task did not succeed");
            }
        }
    }

    let status = pool.status();
    tracing::info!(
        succeeded,
        failed,
        tasks_completed = status.tasks_completed(),
        total_workers = status.total_workers,
        "All tasks settled"
    );

    pool.shutdown()
        .await
        .context("Failed to shut down worker pool")?;

    tracing::info!("Pool demo complete");
    Ok(())
}

fn subscribe_logging(pool: &WorkerPool<HandlerWorkerFactory>) {
    pool.on(PoolEventKind::TaskRetry, |event| {
        if let PoolEvent::TaskRetry {
            task_id,
            retries_left,
            cause,
        } = event
        {
            tracing::info!(task_id = %task_id, retries_left, cause = %cause, "Task retry");
        }
    });

    pool.on(PoolEventKind::TaskFailed, |event| {
        if let PoolEvent::TaskFailed {
            task_id,
            cause,
            attempts,
        } = event
        {
            tracing::warn!(task_id = %task_id, attempts, cause = %cause, "Task failed");
        }
    });

    pool.on(PoolEventKind::WorkerReplaced, |event| {
        if let PoolEvent::WorkerReplaced {
            old_worker_id,
            new_worker_id,
            reason,
        } = event
        {
            tracing::warn!(
                old_worker_id = %old_worker_id,
                new_worker_id = %new_worker_id,
                reason = %reason,
                "Worker replaced"
            );
        }
    });

    pool.on(PoolEventKind::QueueFull, |event| {
        if let PoolEvent::QueueFull { queue_length, .. } = event {
            tracing::warn!(queue_length, "Queue full");
        }
    });

    pool.on(PoolEventKind::Metrics, |event| {
        if let PoolEvent::Metrics(status) = event {
            tracing::info!(
                active_workers = status.active_workers,
                queue_length = status.queue_length,
                pending_tasks = status.pending_tasks,
                "Pool metrics"
            );
        }
    });

    pool.on(PoolEventKind::Shutdown, |_| tracing::info!("Pool shut down"));
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
