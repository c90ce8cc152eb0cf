//! Monte-Carlo π estimation over the collective substrate
//!
//! Each worker samples its share of random points in the unit square,
//! estimates π from the fraction landing inside the quarter circle, and
//! the per-worker estimates are sum-reduced and averaged at the
//! coordinator. Unrelated to the matrix pipeline; it exercises the same
//! broadcast/all-reduce primitives.
//!
//! Run with: cargo run --example monte_carlo_pi -- [workers] [samples]

use std::thread;
use std::time::Instant;

use rand::Rng;
use tormenta::comm::{Group, ReduceOp};
use tormenta::COORDINATOR;

const DEFAULT_SAMPLES: usize = 12_000_000;

fn main() {
    let mut args = std::env::args().skip(1);
    let workers: usize = args
        .next()
        .and_then(|v| v.parse().ok())
        .filter(|&w| w > 0)
        .unwrap_or_else(|| {
            thread::available_parallelism().map(|v| v.get()).unwrap_or(1)
        });
    let samples: usize = args
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SAMPLES)
        .max(workers);

    let start = Instant::now();
    let endpoints = Group::endpoints(workers);

    let estimate = thread::scope(|s| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|ep| {
                s.spawn(move || {
                    // the coordinator decides the per-worker sample count
                    let mut share = vec![if ep.rank() == COORDINATOR {
                        (samples / ep.size()) as f64
                    } else {
                        0.0
                    }];
                    ep.broadcast(COORDINATOR, &mut share).expect("broadcast");
                    let local_samples = share[0] as usize;

                    let mut rng = rand::thread_rng();
                    let mut hits = 0usize;
                    for _ in 0..local_samples {
                        let x: f64 = rng.gen();
                        let y: f64 = rng.gen();
                        if (x * x + y * y).sqrt() <= 1.0 {
                            hits += 1;
                        }
                    }
                    let local_pi = 4.0 * hits as f64 / local_samples as f64;
                    println!(
                        "{local_pi:.6} on worker {} with {local_samples} points.",
                        ep.rank()
                    );

                    let total = ep.all_reduce(ReduceOp::Sum, local_pi).expect("all_reduce");
                    (ep.rank() == COORDINATOR).then(|| total / ep.size() as f64)
                })
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| h.join().expect("worker"))
            .next()
    });

    if let Some(pi) = estimate {
        println!(
            "PI = {pi:.6} (average of {workers} workers) in {:.3} s.",
            start.elapsed().as_secs_f64()
        );
    }
}
