use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hypergrad::{record, Hypergrad, Reverse};

const SHARED: usize = 64;
const AUX: usize = 8;

/// Quadratic training loss over [shared..., aux...]: a banded positive
/// definite quadratic in the shared block, with each auxiliary parameter
/// weighting one contiguous slice of shared squares.
fn train_loss(x: &[Reverse<f64>]) -> Reverse<f64> {
    let mut sum = Reverse::constant(0.0);
    for i in 0..SHARED {
        let a = x[SHARED + i * AUX / SHARED];
        sum = sum + 0.5 * a * x[i] * x[i];
        if i + 1 < SHARED {
            sum = sum + 0.1 * x[i] * x[i + 1];
        }
    }
    sum
}

fn val_loss(x: &[Reverse<f64>]) -> Reverse<f64> {
    let mut sum = Reverse::constant(0.0);
    for i in 0..SHARED {
        sum = sum + x[i] * x[i];
    }
    sum
}

fn bench_neumann_depth(c: &mut Criterion) {
    let shared: Vec<f64> = (0..SHARED).map(|i| 0.5 + 0.01 * i as f64).collect();
    let aux: Vec<f64> = (0..AUX).map(|i| 1.0 + 0.1 * i as f64).collect();
    let joint: Vec<f64> = shared.iter().chain(aux.iter()).copied().collect();

    let (train_tape, _) = record(train_loss, &joint);

    let mut group = c.benchmark_group("neumann_depth");
    for t in [1, 3, 10, 30] {
        group.bench_with_input(BenchmarkId::from_parameter(t), &t, |b, &t| {
            let est = Hypergrad::new(0.05, t);
            b.iter(|| {
                let (mut val_tape, _) = record(val_loss, &shared);
                black_box(
                    est.grad(
                        &mut val_tape,
                        &train_tape,
                        &[aux.clone()],
                        &[shared.clone()],
                    )
                    .unwrap(),
                )
            })
        });
    }
    group.finish();
}

/// Cost of one joint Hessian-vector product through the training tape, the
/// unit the estimator's runtime is linear in.
fn bench_single_hvp(c: &mut Criterion) {
    let shared: Vec<f64> = (0..SHARED).map(|i| 0.5 + 0.01 * i as f64).collect();
    let aux: Vec<f64> = (0..AUX).map(|i| 1.0 + 0.1 * i as f64).collect();
    let joint: Vec<f64> = shared.iter().chain(aux.iter()).copied().collect();

    let (tape, _) = record(train_loss, &joint);
    let mut dir = vec![0.0; SHARED + AUX];
    for (i, d) in dir.iter_mut().enumerate().take(SHARED) {
        *d = 1.0 + 0.01 * i as f64;
    }

    c.bench_function("joint_hvp", |b| {
        b.iter(|| black_box(tape.hvp(black_box(&joint), black_box(&dir))))
    });
}

criterion_group!(benches, bench_neumann_depth, bench_single_hvp);
criterion_main!(benches);
