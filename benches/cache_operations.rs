//! Benchmarks for basic cache operations
//!
//! This benchmark suite measures the performance of:
//! - Cache hits per backend
//! - Cache misses (compute and store)
//! - Tag invalidation with many live entries
//! - Request memo hits

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use parity_deals::backends::{DashMapCache, MokaCache, MokaCacheConfig};
use parity_deals::tags::{CacheTopic, global_tag, user_tag};
use parity_deals::{CacheBackend, CacheManager, CachedQuery, RequestContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    Runtime::new().unwrap_or_else(|_| panic!("Failed to create runtime"))
}

fn backends() -> Vec<(&'static str, Arc<dyn CacheBackend>)> {
    let moka = MokaCache::new(MokaCacheConfig::default())
        .unwrap_or_else(|_| panic!("Failed to create Moka cache"));
    vec![
        ("moka", Arc::new(moka)),
        ("dashmap", Arc::new(DashMapCache::new())),
    ]
}

/// Generate a value of roughly `size` bytes
fn test_data(size: usize) -> Vec<String> {
    vec!["x".repeat(size / 4); 4]
}

/// Benchmark cache hit latency
fn bench_cache_hit(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("cache_hit");
    group.measurement_time(Duration::from_secs(5));

    for (name, backend) in backends() {
        let cache = CacheManager::new(backend);
        let tags = [user_tag("bench", CacheTopic::Products)];
        for size in [100, 10_240] {
            let key = format!("bench:hit:{size}");
            let data = test_data(size);
            rt.block_on(async {
                cache
                    .get_or_compute(&key, &tags, move || async move { Ok(data) })
                    .await
                    .unwrap_or_else(|_| panic!("Failed to warm cache"));
            });

            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        let value: Vec<String> = cache
                            .get_or_compute(&key, &tags, || async { Ok(Vec::new()) })
                            .await
                            .unwrap_or_else(|_| panic!("Failed to read cache"));
                        black_box(value);
                    });
                });
            });
        }
    }

    group.finish();
}

/// Benchmark miss, compute and store
fn bench_cache_miss(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("cache_miss");

    for (name, backend) in backends() {
        let cache = CacheManager::new(backend);
        let tags = [global_tag(CacheTopic::Products)];
        group.bench_function(name, |b| {
            b.iter(|| {
                rt.block_on(async {
                    let key = format!("bench:miss:{}", rand::random::<u64>());
                    let value: u64 = cache
                        .get_or_compute(&key, &tags, || async { Ok(42) })
                        .await
                        .unwrap_or_else(|_| panic!("Failed to compute"));
                    black_box(value);
                });
            });
        });
    }

    group.finish();
}

/// Benchmark invalidating one user's tag among many users' entries
fn bench_invalidate_tag(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("invalidate_tag");

    for entries in [100_u32, 1_000] {
        let cache = CacheManager::new(Arc::new(DashMapCache::new()));
        rt.block_on(async {
            for i in 0..entries {
                let tags = [user_tag(format!("user_{i}"), CacheTopic::Products)];
                cache
                    .get_or_compute(&format!("bench:inv:{i}"), &tags, move || async move { Ok(i) })
                    .await
                    .unwrap_or_else(|_| panic!("Failed to warm cache"));
            }
        });

        let tag = user_tag("user_0", CacheTopic::Products);
        group.bench_with_input(BenchmarkId::from_parameter(entries), &entries, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    cache
                        .invalidate_tag(black_box(&tag))
                        .await
                        .unwrap_or_else(|_| panic!("Failed to invalidate"));
                });
            });
        });
    }

    group.finish();
}

/// Benchmark request memo hits
fn bench_memo_hit(c: &mut Criterion) {
    let rt = runtime();
    let cache = CacheManager::new(Arc::new(DashMapCache::new()));
    let query = CachedQuery::new(
        "bench_memo",
        vec![global_tag(CacheTopic::Countries)],
        |n: u32| async move { Ok::<_, anyhow::Error>(vec![n; 16]) },
    );
    let ctx = RequestContext::new();
    rt.block_on(async {
        query
            .call(&cache, &ctx, 7)
            .await
            .unwrap_or_else(|_| panic!("Failed to warm memo"));
    });

    c.bench_function("memo_hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let value = query
                    .call(&cache, &ctx, black_box(7))
                    .await
                    .unwrap_or_else(|_| panic!("Failed to read memo"));
                black_box(value);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_cache_hit,
    bench_cache_miss,
    bench_invalidate_tag,
    bench_memo_hit
);
criterion_main!(benches);
