//! Pool throughput benchmark
//!
//! End-to-end cost of submit → dispatch → handler → reply → settle with
//! in-process workers. Handlers return immediately so the numbers reflect
//! scheduling overhead rather than work.

use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::join_all;
use serde_json::json;
use tokio::runtime::Runtime;

use worker_pool::{HandlerWorkerFactory, Priority, WorkerPool, WorkerPoolConfig};

fn echo_pool(workers: usize) -> WorkerPool<HandlerWorkerFactory> {
    let factory = HandlerWorkerFactory::new();
    factory.register_handler("echo", |request| async move { Ok(request.payload.data) });

    let config = WorkerPoolConfig::default()
        .with_worker_count(workers)
        .with_max_queue_size(usize::MAX)
        .with_task_timeout(Duration::from_secs(60));
    WorkerPool::new(factory, config).unwrap()
}

/// Batches of tasks spread across a growing number of workers
fn bench_batch_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("pool_throughput/batch");
    let batch = 256u64;
    group.throughput(Throughput::Elements(batch));

    for workers in [1usize, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("workers", workers),
            &workers,
            |b, &workers| {
                b.to_async(&rt).iter_custom(|iters| async move {
                    let pool = echo_pool(workers);
                    pool.warm_up().unwrap();

                    let start = Instant::now();
                    for _ in 0..iters {
                        let handles: Vec<_> = (0..batch)
                            .map(|i| {
                                let priority = if i % 2 == 0 {
                                    Priority::High
                                } else {
                                    Priority::Low
                                };
                                pool.submit("echo", json!({ "i": i }), priority)
                            })
                            .collect();
                        for result in join_all(handles).await {
                            result.unwrap();
                        }
                    }
                    let elapsed = start.elapsed();

                    pool.shutdown().await.unwrap();
                    elapsed
                });
            },
        );
    }

    group.finish();
}

/// Latency of a single task on an otherwise idle pool
fn bench_single_roundtrip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("pool_throughput/roundtrip");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let pool = echo_pool(1);
            pool.warm_up().unwrap();

            let start = Instant::now();
            for i in 0..iters {
                pool.submit("echo", json!(i), Priority::Medium)
                    .await
                    .unwrap();
            }
            let elapsed = start.elapsed();

            pool.shutdown().await.unwrap();
            elapsed
        });
    });

    group.finish();
}

criterion_group!(benches, bench_batch_throughput, bench_single_roundtrip);
criterion_main!(benches);
