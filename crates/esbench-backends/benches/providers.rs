//! Provider comparison benchmarks.
//!
//! Measures single workload operations against the memory and SQLite
//! providers on the same seeded dataset.
//!
//! Example: cargo bench -p esbench-backends --bench providers

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use esbench_backends::{MemoryProvider, SqliteProvider};
use esbench_core::{
    ensure_dataset, OperationLabel, SeedOptions, SharedProvider, Workload, WorkloadConfig,
};

const SIZES: [u64; 2] = [100, 1_000];

const LABELS: [OperationLabel; 4] = [
    OperationLabel::Get,
    OperationLabel::Select,
    OperationLabel::Apply,
    OperationLabel::Patch,
];

fn providers(rt: &Runtime, size: u64) -> Vec<SharedProvider> {
    let memory: SharedProvider = Arc::new(MemoryProvider::new());
    let sqlite: SharedProvider =
        Arc::new(SqliteProvider::open_in_memory().expect("Failed to open SQLite"));
    for provider in [&memory, &sqlite] {
        let seeded = rt.block_on(ensure_dataset(provider.as_ref(), size, &SeedOptions::new()));
        assert!(seeded.is_ready(), "seeding {} failed", provider.backend());
    }
    vec![memory, sqlite]
}

fn bench_operations(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to create Tokio runtime");

    for &size in &SIZES {
        let providers = providers(&rt, size);
        for label in LABELS {
            let mut group = c.benchmark_group(format!("providers/{}", label));
            for provider in &providers {
                let workload = Workload::new(provider.clone(), WorkloadConfig::new(size));
                let mut operation = workload.operation(label);
                group.bench_with_input(
                    BenchmarkId::new(provider.backend(), size),
                    &size,
                    |b, _| {
                        b.to_async(&rt).iter(|| {
                            let pending = (operation.action)();
                            async move { pending.await.expect("operation failed") }
                        });
                    },
                );
            }
            group.finish();
        }
    }
}

criterion_group!(benches, bench_operations);
criterion_main!(benches);
