//! Stress harness for the dynamic rendezvous.
//!
//! Each thread repeatedly joins, attends a pair of meetings (agreeing
//! on the minimum datum across all current participants, then
//! confirming everyone saw the same minimum), and leaves, while other
//! threads do the same concurrently.

use rand::Rng;
use rendezvous::{AtomicCas, Config, Rendezvous, YieldAfter};
use std::sync::atomic::{AtomicBool, Ordering};

struct Agreement {
    min: i32,
    passed: i64,
}

fn worker(rdv: &Rendezvous<i32>, iterations: u32, failed: &AtomicBool) {
    let config = Config::with(YieldAfter { threshold: 5 }, AtomicCas);
    let place = rdv.join(config);
    let mut rng = rand::thread_rng();

    for _ in 0..iterations {
        let datum: i32 = rng.gen_range(0..500);

        let min = place.attend(
            &datum,
            |_passed| i32::MAX,
            |acc, &d| {
                if d < *acc {
                    *acc = d;
                }
            },
            |acc| acc,
        );

        // Second meeting: every participant re-publishes the minimum it
        // computed itself and checks every peer agrees. Comparing the
        // two attends' `passed` counts directly would be racy (a peer
        // may leave between them); comparing the agreed-on *value* is
        // not, since it only depends on what this meeting's own Fold
        // observes.
        let agreement = place.attend(
            &min,
            |passed| Agreement {
                min,
                passed: passed as i64,
            },
            |acc, &peer_min| {
                if peer_min != acc.min {
                    acc.passed = -1;
                }
            },
            |acc| acc,
        );

        if agreement.passed < 0 {
            failed.store(true, Ordering::Relaxed);
        }

        if rng.gen_bool(0.5) {
            std::thread::yield_now();
        }
    }
}

fn run_round(n_threads: usize, iterations: u32) -> bool {
    let rdv: Rendezvous<i32> = Rendezvous::new();
    let failed = AtomicBool::new(false);
    std::thread::scope(|scope| {
        for _ in 0..n_threads {
            let rdv = &rdv;
            let failed = &failed;
            scope.spawn(move || worker(rdv, iterations, failed));
        }
    });
    !failed.load(Ordering::Relaxed)
}

fn main() {
    let mut rng = rand::thread_rng();
    let rounds = 200;
    for round in 0..rounds {
        let n_threads = rng.gen_range(2..50);
        let iterations = rng.gen_range(1..200);
        eprint!("round {round:03}: threads = {n_threads}, iterations = {iterations} ... ");
        if run_round(n_threads, iterations) {
            eprintln!("ok");
        } else {
            eprintln!("FAILED: participants disagreed on the minimum");
            std::process::exit(1);
        }
    }
}
