//! Micro-benchmarks for the hot graph operations: ready-set computation and
//! completion-driven edge removal.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use qlp::domain::models::graph::TaskGraph;
use qlp::domain::models::intent::IntentId;
use qlp::domain::models::task::{Task, TaskId, TaskKind};

fn layered_graph(layers: usize, width: usize) -> TaskGraph {
    let mut graph = TaskGraph::new();
    for layer in 0..layers {
        for slot in 0..width {
            let task = Task::new(
                IntentId::from("bench"),
                TaskKind::Codegen,
                format!("layer {layer} slot {slot}"),
            )
            .with_id(format!("t-{layer:02}-{slot:02}"));
            graph.add_task(task).unwrap();
        }
    }
    for layer in 1..layers {
        for slot in 0..width {
            let from = TaskId(format!("t-{:02}-{slot:02}", layer - 1));
            let to = TaskId(format!("t-{layer:02}-{slot:02}"));
            graph.add_edge(&from, &to).unwrap();
        }
    }
    graph
}

fn bench_ready_tasks(c: &mut Criterion) {
    let mut group = c.benchmark_group("ready_tasks");
    for width in [8usize, 32, 128] {
        let graph = layered_graph(8, width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &graph, |b, g| {
            b.iter(|| g.ready_tasks().len());
        });
    }
    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    c.bench_function("drain_8x32", |b| {
        b.iter_batched(
            || layered_graph(8, 32),
            |mut graph| {
                while let Some(id) = graph.ready_tasks().first().map(|t| t.id.clone()) {
                    graph.mark_complete(&id);
                }
                graph
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_serialization(c: &mut Criterion) {
    let graph = layered_graph(8, 32);
    c.bench_function("serde_round_trip_8x32", |b| {
        b.iter(|| {
            let bytes = graph.to_bytes().unwrap();
            TaskGraph::from_bytes(&bytes).unwrap()
        });
    });
}

criterion_group!(benches, bench_ready_tasks, bench_drain, bench_serialization);
criterion_main!(benches);
