//! Benchmarks the cost of a meeting as the number of participants
//! grows, and the cost of repeated meetings among a fixed group.

use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rendezvous::{Config, Rendezvous};

fn bench_meeting(n_threads: usize) -> Duration {
    let rdv: Rendezvous<usize> = Rendezvous::new();
    let start = Instant::now();
    std::thread::scope(|scope| {
        for n in 0..n_threads {
            let rdv = &rdv;
            scope.spawn(move || {
                let place = rdv.join(Config::new());
                let sum = place.attend(&n, |_passed| 0usize, |acc, d| *acc += *d, |acc| acc);
                criterion::black_box(sum);
            });
        }
    });
    start.elapsed()
}

fn bench_sequence(n_threads: usize, n_meetings: usize) -> Duration {
    let rdv: Rendezvous<usize> = Rendezvous::new();
    let start = Instant::now();
    std::thread::scope(|scope| {
        for n in 0..n_threads {
            let rdv = &rdv;
            scope.spawn(move || {
                let place = rdv.join(Config::new());
                for _ in 0..n_meetings {
                    let sum = place.attend(&n, |_passed| 0usize, |acc, d| *acc += *d, |acc| acc);
                    criterion::black_box(sum);
                }
            });
        }
    });
    start.elapsed()
}

fn bench_single_meeting(c: &mut Criterion) {
    let mut group = c.benchmark_group("Single meeting, growing participants");
    for n_threads in [2usize, 4, 8, 16, 32, 64] {
        group.bench_with_input(BenchmarkId::new("join+attend+leave", n_threads), &n_threads, |b, &n| {
            b.iter(|| bench_meeting(n))
        });
    }
    group.finish();
}

fn bench_repeated_meetings(c: &mut Criterion) {
    let mut group = c.benchmark_group("10 meetings, fixed participants");
    for n_threads in [2usize, 8, 32] {
        group.bench_with_input(BenchmarkId::new("attend x10", n_threads), &n_threads, |b, &n| {
            b.iter(|| bench_sequence(n, 10))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_meeting, bench_repeated_meetings);
criterion_main!(benches);
