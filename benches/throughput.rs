//! Throughput Benchmark for Cacher
//!
//! Measures the storage engine and the wire codec under a few workloads.

use cacher::commands::CommandHandler;
use cacher::protocol::{Request, Response};
use cacher::storage::StorageEngine;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine.set(format!("key:{}", i), "small_value");
            i += 1;
        });
    });

    group.bench_function("set_medium", |b| {
        let mut i = 0u64;
        let value = "x".repeat(1024);
        b.iter(|| {
            engine.set(format!("key:{}", i), value.as_str());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..100_000 {
        engine.set(format!("key:{}", i), format!("value:{}", i));
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark mixed workload (80% reads, 20% writes)
fn bench_mixed(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..10_000 {
        engine.set(format!("key:{}", i), format!("value:{}", i));
    }

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                engine.set(format!("new:{}", i), "value");
            } else {
                let key = format!("key:{}", i % 10_000);
                black_box(engine.get(&key));
            }
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent access through the single table lock
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = format!("key:{}:{}", t, i);
                            engine.set(key.clone(), "value");
                            engine.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// Benchmark expiry operations
fn bench_expiry(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("expiry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("expire_existing", |b| {
        for i in 0..10_000 {
            engine.set(format!("expire:{}", i), "value");
        }
        let at = SystemTime::now() + Duration::from_secs(3600);

        let mut i = 0u64;
        b.iter(|| {
            let key = format!("expire:{}", i % 10_000);
            engine.expire_at(&key, at);
            i += 1;
        });
    });

    group.bench_function("cleanup_nothing_expired", |b| {
        b.iter(|| black_box(engine.cleanup_expired()));
    });

    group.finish();
}

/// Benchmark decoding requests and executing them end to end (no I/O)
fn bench_codec(c: &mut Criterion) {
    let handler = CommandHandler::new(Arc::new(StorageEngine::new()));

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1));

    group.bench_function("decode_set", |b| {
        b.iter(|| black_box(Request::decode(black_box(b"SET user:42 some value\n"))));
    });

    group.bench_function("decode_execute_encode", |b| {
        b.iter(|| {
            let response = match Request::decode(b"SET user:42 some value\n") {
                Ok(request) => handler.execute(request),
                Err(e) => Response::from(e),
            };
            black_box(response.encode());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_mixed,
    bench_concurrent,
    bench_expiry,
    bench_codec,
);

criterion_main!(benches);
