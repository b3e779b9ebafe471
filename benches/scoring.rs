//! Benchmarks for the scoring table and item draws.
//!
//! Run with: cargo bench --bench scoring

// Allow benchmark-specific patterns
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use year_duel::rng::{Pcg32, SeedableRng};
use year_duel::scoring::score;
use year_duel::{Catalog, ItemDeck};

fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("score");

    for distance in [0_i64, 50, 300, 800, 1500, 100_000] {
        group.bench_with_input(
            BenchmarkId::new("distance", distance),
            &distance,
            |b, &distance| {
                b.iter(|| score(black_box(1900 - distance), black_box(1900)));
            },
        );
    }

    group.bench_function("extreme_inputs", |b| {
        b.iter(|| score(black_box(i64::MIN), black_box(i64::MAX)));
    });

    group.finish();
}

fn bench_draw(c: &mut Criterion) {
    let catalog = Catalog::builtin();
    let mut group = c.benchmark_group("ItemDeck");

    group.bench_function("draw_full_cycle", |b| {
        let mut rng = Pcg32::seed_from_u64(7);
        b.iter(|| {
            let mut deck = ItemDeck::new();
            for _ in 0..catalog.len() {
                black_box(deck.draw(&catalog, &mut rng));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_score, bench_draw);
criterion_main!(benches);
