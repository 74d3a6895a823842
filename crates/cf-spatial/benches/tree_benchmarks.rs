//! Benchmarks for the bounding box tree.
//!
//! Run with: cargo bench -p cf-spatial
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p cf-spatial -- --save-baseline main
//! 2. After changes: cargo bench -p cf-spatial -- --baseline main

#![allow(missing_docs, clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use cf_spatial::{Aabb, BBTree};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::{Point2, Vector2};
use rand::Rng;

// =============================================================================
// Scene Generation
// =============================================================================

/// Scatter `count` small boxes over a square world sized for ~4 neighbors each.
fn random_boxes(count: usize) -> Vec<Aabb> {
    let mut rng = rand::thread_rng();
    let extent = (count as f64).sqrt() * 2.0;
    (0..count)
        .map(|_| {
            let center = Point2::new(rng.gen_range(0.0..extent), rng.gen_range(0.0..extent));
            let half = Vector2::new(rng.gen_range(0.2..0.8), rng.gen_range(0.2..0.8));
            Aabb::from_center(center, half)
        })
        .collect()
}

fn build(boxes: &[Aabb]) -> BBTree<usize> {
    let mut tree = BBTree::new();
    for key in 0..boxes.len() {
        let _ = tree.insert(key, &|i: usize| boxes[i]);
    }
    tree
}

/// Move a tenth of the boxes by a random offset.
fn jitter(boxes: &mut [Aabb]) {
    let mut rng = rand::thread_rng();
    let step = boxes.len() / 10 + 1;
    for bb in boxes.iter_mut().step_by(step.max(1)).take(boxes.len() / 10) {
        let offset = Vector2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        *bb = Aabb::new(bb.min + offset, bb.max + offset);
    }
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for count in [100, 1_000, 10_000] {
        let boxes = random_boxes(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &boxes, |b, boxes| {
            b.iter(|| black_box(build(boxes)));
        });
    }

    group.finish();
}

fn bench_reindex_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("reindex_query");

    for count in [100, 1_000, 10_000] {
        let mut boxes = random_boxes(count);
        let mut tree = build(&boxes);
        jitter(&mut boxes);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &boxes, |b, boxes| {
            b.iter(|| {
                let mut pairs = 0_usize;
                tree.reindex_query(&|i: usize| boxes[i], |_, _| pairs += 1);
                black_box(pairs)
            });
        });
    }

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");

    let boxes = random_boxes(10_000);
    let mut tree = build(&boxes);
    tree.optimize();
    let extent = (boxes.len() as f64).sqrt() * 2.0;

    group.bench_function("region", |b| {
        let region = Aabb::from_edges(extent * 0.4, extent * 0.4, extent * 0.6, extent * 0.6);
        b.iter(|| {
            let mut hits = 0_usize;
            tree.query(black_box(&region), |_| hits += 1);
            black_box(hits)
        });
    });

    group.bench_function("segment", |b| {
        let start = Point2::new(0.0, 0.0);
        let end = Point2::new(extent, extent);
        b.iter(|| {
            tree.segment_query(black_box(&start), black_box(&end), 1.0, |key| {
                boxes[key].segment_fraction(&start, &end)
            })
        });
    });

    group.finish();
}

fn bench_optimize(c: &mut Criterion) {
    let boxes = random_boxes(5_000);
    let tree = build(&boxes);

    c.bench_function("optimize_5000", |b| {
        b.iter_batched(
            || tree.clone(),
            |mut tree| {
                tree.optimize();
                tree
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_reindex_query,
    bench_queries,
    bench_optimize
);
criterion_main!(benches);
