use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tormenta::kernel::matmul_blocked;
use tormenta::{run, Matrix, RunConfig};

fn bench_blocked_matmul(c: &mut Criterion) {
    let mut group = c.benchmark_group("matmul_blocked");

    // Same dimension under different block sizes to show the cache effect
    let shapes = vec![(64, 8), (64, 16), (128, 16), (256, 16), (256, 32)];

    for (n, bs) in shapes {
        let id = format!("{n}x{n}_bs{bs}");
        let a = Matrix::row_ramp(n).unwrap();
        let b = Matrix::column_ramp(n).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(&id),
            &(&a, &b),
            |bench, (a, b)| {
                let mut dst = vec![0.0; n * n];
                bench.iter(|| {
                    matmul_blocked(
                        black_box(a.as_slice()),
                        black_box(b.as_slice()),
                        &mut dst,
                        n,
                        bs,
                    );
                    black_box(&dst);
                });
            },
        );
    }

    group.finish();
}

fn bench_row_band(c: &mut Criterion) {
    let mut group = c.benchmark_group("matmul_blocked_band");

    // One worker's share of a 256-dimension problem at various splits
    let n = 256;
    let b = Matrix::column_ramp(n).unwrap();
    for p in [1, 2, 4, 8] {
        let rows = n / p;
        let id = format!("{rows}x{n}_of_{n}");
        let a = Matrix::row_ramp(n).unwrap();
        let band = a.as_slice()[..rows * n].to_vec();

        group.bench_with_input(BenchmarkId::from_parameter(&id), &band, |bench, band| {
            let mut dst = vec![0.0; band.len()];
            bench.iter(|| {
                matmul_blocked(black_box(band), black_box(b.as_slice()), &mut dst, n, 16);
                black_box(&dst);
            });
        });
    }

    group.finish();
}

fn bench_pipeline_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");

    for (n, bs, p) in [(32, 8, 2), (64, 8, 4), (64, 16, 4)] {
        let id = format!("{n}x{n}_bs{bs}_p{p}");
        let cfg = RunConfig::new(n, bs, p).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(&id), &cfg, |bench, cfg| {
            bench.iter(|| {
                let outcome = run(black_box(cfg)).unwrap();
                black_box(outcome);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_blocked_matmul,
    bench_row_band,
    bench_pipeline_end_to_end
);
criterion_main!(benches);
