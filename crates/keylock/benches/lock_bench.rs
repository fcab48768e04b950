// Benchmarks for the lock protocol hot paths
// Measures token generation, backoff computation and in-memory obtain/release

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use keylock::{Context, LockClient, LockOptions, MemoryLockStore, RetryStrategy, TokenGenerator};

fn bench_token_generate(c: &mut Criterion) {
    let generator = TokenGenerator::new();

    c.bench_function("token_generate", |b| b.iter(|| black_box(generator.generate())));
}

fn bench_next_backoff(c: &mut Criterion) {
    let strategy = RetryStrategy::exponential(Duration::from_millis(10), Duration::from_secs(5))
        .with_jitter(0.1)
        .limit(20);

    c.bench_function("next_backoff_limited_exponential", |b| {
        b.iter(|| black_box(strategy.next_backoff(black_box(7))))
    });
}

fn bench_obtain_release(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let client = LockClient::new(Arc::new(MemoryLockStore::new()));
    let ctx = Context::background();
    let opts = LockOptions::default();

    c.bench_function("memory_obtain_release", |b| {
        b.to_async(&rt).iter(|| async {
            let lock = client
                .obtain(&ctx, "bench", Duration::from_secs(10), &opts)
                .await
                .unwrap();
            lock.release(&ctx).await.unwrap();
        })
    });
}

fn bench_contended_obtain(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let client = LockClient::new(Arc::new(MemoryLockStore::new()));
    let ctx = Context::background();
    let opts = LockOptions::default();
    let _holder = rt
        .block_on(client.obtain(&ctx, "held", Duration::from_secs(3600), &opts))
        .unwrap();

    c.bench_function("memory_obtain_contended", |b| {
        b.to_async(&rt).iter(|| async {
            let result = client
                .obtain(&ctx, "held", Duration::from_secs(10), &opts)
                .await;
            black_box(result.is_err())
        })
    });
}

criterion_group!(
    benches,
    bench_token_generate,
    bench_next_backoff,
    bench_obtain_release,
    bench_contended_obtain
);
criterion_main!(benches);
