use admission_gate::{
    AdmissionGate, CacheEntry, Clock, Decision, EvaluateOptions, Fingerprint, Metrics,
    OldestFractionEviction, OperationOutcome, RateLimiter, RateWindow, ShardedStorage,
    SystemClock, TtlCache,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

/// Benchmark raw cache reads and writes
fn bench_ttl_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("ttl_cache");
    let clock = SystemClock::new();

    for size in [100usize, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(1000));

        group.bench_with_input(BenchmarkId::new("hits", size), size, |b, &size| {
            let cache = TtlCache::new(
                Arc::new(ShardedStorage::<Fingerprint, CacheEntry>::with_capacity(size)),
                Duration::from_secs(300),
                Duration::from_secs(300),
                Arc::new(OldestFractionEviction::new(size, 0.3)),
                Metrics::new(),
            );
            let keys: Vec<Fingerprint> = (0..size)
                .map(|i| Fingerprint::from_raw(format!("report/{}", i)))
                .collect();
            for key in &keys {
                cache.put(key.clone(), OperationOutcome::success(json!(1)), clock.now());
            }

            b.iter(|| {
                let now = clock.now();
                for key in keys.iter().take(1000) {
                    black_box(cache.get(black_box(key), now));
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("churn", size), size, |b, &size| {
            let cache = TtlCache::new(
                Arc::new(ShardedStorage::<Fingerprint, CacheEntry>::with_capacity(size)),
                Duration::from_secs(300),
                Duration::from_secs(300),
                Arc::new(OldestFractionEviction::new(size, 0.3)),
                Metrics::new(),
            );
            let mut next = 0u64;

            b.iter(|| {
                for _ in 0..1000 {
                    next += 1;
                    black_box(cache.put(
                        Fingerprint::from_raw(format!("k{}", next)),
                        OperationOutcome::success(json!(next)),
                        clock.now(),
                    ));
                }
            })
        });
    }

    group.finish();
}

/// Benchmark contended admission on a single identity
fn bench_rate_limiter_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiter");
    let clock = SystemClock::new();

    for threads in [1usize, 4, 8].iter() {
        group.throughput(Throughput::Elements((*threads * 1000) as u64));

        group.bench_with_input(
            BenchmarkId::new("check_and_record", threads),
            threads,
            |b, &threads| {
                let limiter = Arc::new(RateLimiter::new(
                    Arc::new(ShardedStorage::<String, RateWindow>::new()),
                    u64::MAX,
                    u64::MAX,
                ));

                b.iter(|| {
                    std::thread::scope(|scope| {
                        for t in 0..threads {
                            let limiter = &limiter;
                            let clock = &clock;
                            scope.spawn(move || {
                                let identity = format!("user-{}", t % 2);
                                for _ in 0..1000 {
                                    black_box(limiter.check_and_record(&identity, clock.now()));
                                }
                            });
                        }
                    });
                })
            },
        );
    }

    group.finish();
}

/// Benchmark full gate decisions
fn bench_gate(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate");
    let rt = runtime();

    group.bench_function("evaluate_cached", |b| {
        let gate = AdmissionGate::builder()
            .with_rate_limits(u64::MAX, u64::MAX)
            .with_burst_detection(Duration::ZERO, 5)
            .build()
            .unwrap();
        rt.block_on(async {
            if let Ok(Decision::Proceed(token)) =
                gate.evaluate("u1", "hot", EvaluateOptions::default()).await
            {
                gate.record(token, OperationOutcome::success(json!({ "ok": true })))
                    .await;
            }
        });

        let gate = &gate;
        b.to_async(&rt).iter(|| async move {
            black_box(
                gate.evaluate(black_box("u1"), black_box("hot"), EvaluateOptions::default())
                    .await,
            )
        })
    });

    group.bench_function("evaluate_and_record", |b| {
        let gate = AdmissionGate::builder()
            .with_rate_limits(u64::MAX, u64::MAX)
            .with_burst_detection(Duration::ZERO, 5)
            .build()
            .unwrap();
        let mut next = 0u64;

        b.to_async(&rt).iter(|| {
            next += 1;
            let gate = gate.clone();
            let key = format!("k{}", next);
            async move {
                if let Ok(Decision::Proceed(token)) =
                    gate.evaluate("u1", &key, EvaluateOptions::default()).await
                {
                    gate.record(token, OperationOutcome::success(json!(1))).await;
                }
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_ttl_cache,
    bench_rate_limiter_contention,
    bench_gate
);
criterion_main!(benches);
