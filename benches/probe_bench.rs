//! Probe Pipeline Benchmarks — Hot-Path Performance Validation
//!
//! Benchmarks digesting, observation recording and a full scheduled
//! probe batch against an in-memory fetcher.
//!
//! Run with: cargo bench --bench probe_bench

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use hashcheck_exporter::domain::{digest, FetchOutcome, TargetSpec, TargetState};
use hashcheck_exporter::ports::Fetcher;
use hashcheck_exporter::usecases::probe::probe_target;
use hashcheck_exporter::usecases::scheduler::ProbeScheduler;

struct InMemory(Vec<u8>);

#[async_trait]
impl Fetcher for InMemory {
    async fn fetch(&self, _url: &str) -> FetchOutcome {
        FetchOutcome::Complete {
            elapsed: Duration::ZERO,
            status: 200,
            body: self.0.clone(),
        }
    }
}

/// Benchmark SHA-256 digesting for typical body sizes.
fn bench_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest");
    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let body = vec![0x5au8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, body| {
            b.iter(|| digest(black_box(body)));
        });
    }
    group.finish();
}

/// Benchmark folding one fetch outcome into target state.
fn bench_record(c: &mut Criterion) {
    let body = vec![0x5au8; 16 * 1024];
    let mut state = TargetState::new(TargetSpec::new("http://a.test/", Some(digest(&body))));

    c.bench_function("record_16k_verified", |b| {
        b.iter(|| {
            state.record(FetchOutcome::Complete {
                elapsed: Duration::ZERO,
                status: 200,
                body: black_box(body.clone()),
            })
        });
    });
}

/// Benchmark a 100-target batch through the bounded worker pool.
fn bench_scheduler_batch(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let fetcher = Arc::new(InMemory(vec![0x5au8; 4096]));

    let mut group = c.benchmark_group("probe_batch_100");
    for workers in [1usize, 5, 20] {
        let scheduler = ProbeScheduler::new(workers);
        group.bench_with_input(BenchmarkId::from_parameter(workers), &scheduler, |b, scheduler| {
            b.to_async(&runtime).iter(|| {
                let fetcher = Arc::clone(&fetcher);
                let states: Vec<TargetState> = (0..100)
                    .map(|i| TargetState::new(TargetSpec::observe(format!("http://t{i}.test/"))))
                    .collect();
                async move {
                    scheduler
                        .run_all(states, move |mut state| {
                            let fetcher = Arc::clone(&fetcher);
                            async move { probe_target(fetcher.as_ref(), &mut state).await }
                        })
                        .await
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_digest, bench_record, bench_scheduler_batch);
criterion_main!(benches);
