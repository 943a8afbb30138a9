use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::Value;
use std::sync::Arc;
use strands_core::orchestration::{action_fn, find_viable_steps, validate_graph, Step};
use strands_core::run_store::InMemoryRunStore;
use strands_core::{Collaborators, Strand, StrandsConfig};

/// Layered graph: every step in layer `n` depends on every step in layer `n - 1`
fn layered_steps(layers: usize, width: usize) -> Vec<Step> {
    let id = |layer: usize, index: usize| format!("l{layer}_s{index}");
    (0..layers)
        .flat_map(|layer| {
            (0..width).map(move |index| {
                let dependencies: Vec<String> = if layer == 0 {
                    Vec::new()
                } else {
                    (0..width).map(|dep| id(layer - 1, dep)).collect()
                };
                Step::new(
                    id(layer, index),
                    "bench",
                    "",
                    action_fn(|_, _| async { Ok(Value::Null) }),
                )
                .depends_on(dependencies)
            })
        })
        .collect()
}

fn benchmark_ready_set_discovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_viable_steps");
    for (layers, width) in [(5, 4), (10, 10), (20, 25)] {
        let steps = layered_steps(layers, width);
        group.bench_with_input(
            BenchmarkId::from_parameter(steps.len()),
            &steps,
            |b, steps| b.iter(|| find_viable_steps(black_box(steps))),
        );
    }
    group.finish();
}

fn benchmark_graph_validation(c: &mut Criterion) {
    let steps = layered_steps(20, 25);
    c.bench_function("validate_graph_500", |b| {
        b.iter(|| validate_graph(black_box(&steps)))
    });
}

fn benchmark_strand_execution(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    c.bench_function("execute_layered_strand_100", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut strand = Strand::new(
                    "strand_bench",
                    "Bench",
                    "",
                    Vec::new(),
                    layered_steps(10, 10),
                    Collaborators::default(),
                    Arc::new(InMemoryRunStore::new()),
                    &StrandsConfig::default(),
                )
                .unwrap();
                black_box(strand.execute().await.unwrap());
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_ready_set_discovery,
    benchmark_graph_validation,
    benchmark_strand_execution
);
criterion_main!(benches);
