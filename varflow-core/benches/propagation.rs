//! Benchmarks for staleness propagation and lazy re-evaluation.
//!
//! Compares a deep chain, a wide fan-out, and the cost of reading a fresh
//! (cached) node.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use varflow_core::{ops, Graph, Variable};

const CHAIN_LEN: usize = 1_000;
const FAN_OUT: usize = 1_000;

fn build_chain(graph: &Graph) -> (Variable, Vec<Variable>) {
    let leaf = graph.create_leaf(vec![0.0; 64], None, None).unwrap();
    let mut nodes = vec![leaf.clone()];
    for _ in 0..CHAIN_LEN {
        let next = ops::add(nodes.last().unwrap(), 1.0).unwrap();
        nodes.push(next);
    }
    (leaf, nodes)
}

fn bench_chain(c: &mut Criterion) {
    let graph = Graph::new();
    let (leaf, nodes) = build_chain(&graph);
    let tip = nodes.last().unwrap();
    let mut x = 0.0;

    c.bench_function("chain_1k_set_and_evaluate", |b| {
        b.iter(|| {
            x += 1.0;
            leaf.set_value(x).unwrap();
            black_box(tip.value().unwrap());
        })
    });
}

fn bench_fan_out(c: &mut Criterion) {
    let graph = Graph::new();
    let leaf = graph.scalar(0.0);
    let dependents: Vec<Variable> = (0..FAN_OUT)
        .map(|i| ops::multiply(&leaf, i as f64).unwrap())
        .collect();
    let mut x = 0.0;

    c.bench_function("fan_out_1k_propagate", |b| {
        b.iter(|| {
            for d in &dependents {
                black_box(d.value().unwrap());
            }
            x += 1.0;
            leaf.set_value(x).unwrap();
        })
    });
}

fn bench_cached_read(c: &mut Criterion) {
    let graph = Graph::new();
    let (_leaf, nodes) = build_chain(&graph);
    let tip = nodes.last().unwrap();
    tip.value().unwrap();

    c.bench_function("cached_read", |b| b.iter(|| black_box(tip.value().unwrap())));
}

criterion_group!(benches, bench_chain, bench_fan_out, bench_cached_read);
criterion_main!(benches);
