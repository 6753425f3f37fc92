//! Benchmarks for the merge pipeline.
//!
//! ```bash
//! cargo bench --features test-utils --bench pipeline_bench
//! cargo bench --features test-utils --bench pipeline_bench gates_
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use merge_guard::core::MergeContext;
use merge_guard::gates::GateSet;
use merge_guard::pipeline::Pipeline;
use merge_guard::prelude::*;
use merge_guard::test_fixtures::RetailDataset;
use tokio::runtime::Runtime;

fn config() -> PipelineConfig {
    PipelineConfig::default().with_timestamp(false)
}

// ============================================================================
// Full Pipeline
// ============================================================================

fn benchmark_full_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_full_run");
    let rt = Runtime::new().unwrap();

    // stores x departments x weeks
    for (stores, departments, weeks) in [(5, 10, 10), (20, 40, 20), (45, 81, 20)] {
        let dataset = RetailDataset::generate(stores, departments, weeks, 42);
        let rows = dataset.sales.len();
        let pipeline = Pipeline::new(config()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(rows), &dataset, |b, dataset| {
            b.iter(|| {
                rt.block_on(async {
                    let mut ctx = MergeContext::new().unwrap();
                    dataset.register(&mut ctx, &pipeline.config().tables).unwrap();
                    std::hint::black_box(pipeline.run(&mut ctx).await.unwrap())
                })
            });
        });
    }
    group.finish();
}

// ============================================================================
// Gate Set
// ============================================================================

fn benchmark_gates(c: &mut Criterion) {
    let mut group = c.benchmark_group("gates_retail");
    let rt = Runtime::new().unwrap();

    for (stores, departments, weeks) in [(10, 20, 10), (45, 81, 20)] {
        let dataset = RetailDataset::generate(stores, departments, weeks, 7);
        let config = config();
        let pipeline = Pipeline::new(config.clone()).unwrap();

        // Leave a merged table registered to run the gates against.
        let mut ctx = MergeContext::new().unwrap();
        dataset.register(&mut ctx, &config.tables).unwrap();
        rt.block_on(pipeline.run(&mut ctx)).unwrap();
        let gates = GateSet::retail(&config);

        group.bench_with_input(
            BenchmarkId::from_parameter(dataset.sales.len()),
            &ctx,
            |b, ctx| {
                b.iter(|| {
                    rt.block_on(async {
                        std::hint::black_box(
                            gates.run(ctx.inner(), &config.tables.merged).await.unwrap(),
                        )
                    })
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    name = pipeline_benches;
    config = Criterion::default().sample_size(10);
    targets = benchmark_full_run
);

criterion_group!(
    name = gate_benches;
    config = Criterion::default().sample_size(20);
    targets = benchmark_gates
);

criterion_main!(pipeline_benches, gate_benches);
