//! Criterion benchmarks for patchbay-core curve and tempo math
//!
//! Run with: cargo bench -p patchbay-core
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use patchbay_core::{EnvelopeSpec, TempoChange, TempoMap, inv_t_from_u, shaped_t};

const RESOLUTIONS: &[usize] = &[32, 128, 512, 2048];

fn bench_curve(c: &mut Criterion) {
    let mut group = c.benchmark_group("Curve");

    for &shape in &[0.0, 0.5, -0.9] {
        group.bench_with_input(BenchmarkId::new("shaped_t", shape), &shape, |b, &shape| {
            b.iter(|| {
                let mut acc = 0.0;
                for i in 0..1024 {
                    acc += shaped_t(black_box(i as f64 / 1023.0), shape);
                }
                black_box(acc)
            });
        });

        group.bench_with_input(BenchmarkId::new("inv_t_from_u", shape), &shape, |b, &shape| {
            b.iter(|| {
                let mut acc = 0.0;
                for i in 0..1024 {
                    acc += inv_t_from_u(black_box(i as f64 / 1023.0), shape);
                }
                black_box(acc)
            });
        });
    }

    group.finish();
}

fn bench_envelope_bake(c: &mut Criterion) {
    let mut group = c.benchmark_group("EnvelopeBake");
    let env = EnvelopeSpec {
        attack_shape: 0.4,
        decay_shape: -0.3,
        release_shape: 0.7,
        ..EnvelopeSpec::default()
    };

    for &resolution in RESOLUTIONS {
        group.bench_with_input(
            BenchmarkId::new("bake", resolution),
            &resolution,
            |b, &resolution| b.iter(|| black_box(env.bake(resolution))),
        );
    }

    group.finish();
}

fn bench_tempo(c: &mut Criterion) {
    let mut group = c.benchmark_group("TempoMap");

    for &count in &[1usize, 16, 256] {
        let changes: Vec<TempoChange> = (0..count)
            .map(|i| TempoChange::new(i as u64 * 480, 80.0 + (i % 7) as f64 * 20.0))
            .collect();
        let map = TempoMap::new(&changes, 480, 1.0);
        let span = (count as f64) * 480.0;

        group.bench_with_input(BenchmarkId::new("tick_to_seconds", count), &count, |b, _| {
            b.iter(|| {
                let mut acc = 0.0;
                for i in 0..1024 {
                    acc += map.tick_to_seconds(black_box(span * i as f64 / 1024.0));
                }
                black_box(acc)
            });
        });

        group.bench_with_input(BenchmarkId::new("build", count), &count, |b, _| {
            b.iter(|| black_box(TempoMap::new(black_box(&changes), 480, 1.0)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_curve, bench_envelope_bake, bench_tempo);
criterion_main!(benches);
