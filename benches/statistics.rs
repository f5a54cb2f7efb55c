//! Statistics and ingestion benchmarks
//!
//! Full recomputation runs on every read of a live experiment, so its cost
//! scales with the number of variations. Ingestion measures one locked
//! read-modify-commit cycle against the in-memory store.
//!
//! Run with: cargo bench --bench statistics

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ab_engine::engine::{EventKind, OutcomeEvent};
use ab_engine::experiment::{Experiment, ExperimentConfig, Variation};
use ab_engine::stats::{compute_experiment_results, confidence_interval, normal_cdf};
use ab_engine::store::MemoryExperimentStore;
use ab_engine::ExperimentEngine;
use tokio::runtime::Runtime;

const VARIATION_COUNTS: [usize; 3] = [2, 5, 20];

fn config(variations: usize) -> ExperimentConfig {
    #[allow(clippy::cast_precision_loss)]
    let share = 100.0 / variations as f64;
    let mut builder = ExperimentConfig::builder("exp-bench", "Bench", "page")
        .start_immediately(true);
    for i in 0..variations {
        builder = builder.variation(Variation::new(format!("v{i}"), format!("c{i}"), share));
    }
    builder.build()
}

/// Running experiment with traffic on every variation.
fn populated(runtime: &Runtime, variations: usize) -> Experiment {
    runtime.block_on(async {
        let engine = ExperimentEngine::new(MemoryExperimentStore::new());
        engine.create_experiment(config(variations)).await.unwrap();

        let mut events = Vec::new();
        for i in 0..variations {
            let id = format!("v{i}");
            events.extend((0..1000).map(|_| OutcomeEvent::visitor(id.as_str())));
            events.extend((0..(100 + i * 10)).map(|_| OutcomeEvent::conversion(id.as_str())));
        }
        engine.record_events("exp-bench", &events).await.unwrap();
        engine.get_experiment("exp-bench").await.unwrap()
    })
}

/// Benchmark the primitive estimators
fn bench_primitives(c: &mut Criterion) {
    let mut group = c.benchmark_group("stats_primitives");

    group.bench_function("normal_cdf", |b| {
        b.iter(|| normal_cdf(black_box(1.73)));
    });
    group.bench_function("wilson_interval", |b| {
        b.iter(|| confidence_interval(black_box(140), black_box(1000)));
    });

    group.finish();
}

/// Benchmark full recomputation by variation count
fn bench_compute(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("compute_experiment_results");

    for variations in VARIATION_COUNTS {
        let experiment = populated(&runtime, variations);
        group.bench_with_input(
            BenchmarkId::from_parameter(variations),
            &experiment,
            |b, experiment| {
                b.iter(|| compute_experiment_results(black_box(experiment)));
            },
        );
    }

    group.finish();
}

/// Benchmark single-event ingestion
fn bench_record_event(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let engine = ExperimentEngine::new(MemoryExperimentStore::new());
    runtime
        .block_on(engine.create_experiment(config(2)))
        .unwrap();

    c.bench_function("record_event_visitor", |b| {
        b.to_async(&runtime).iter(|| async {
            engine
                .record_event("exp-bench", "v1", EventKind::Visitor, None)
                .await
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_primitives, bench_compute, bench_record_event);
criterion_main!(benches);
