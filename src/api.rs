//! Closure-tracing entry points.
//!
//! [`record`] traces a scalar function into a re-evaluable [`Tape`]; the
//! convenience wrappers [`grad`] and [`hvp`] record and differentiate in one
//! call. Callers of the hypergradient estimator use [`record`] to build the
//! validation-loss and training-loss tapes.

use crate::float::Float;
use crate::reverse::Reverse;
use crate::scalar::Scalar;
use crate::tape::{Tape, TapeGuard, TapeThreadLocal};

/// Record a scalar function into a [`Tape`] that can be re-evaluated and
/// differentiated at different inputs without re-recording.
///
/// Returns the tape and the output value from the recording pass.
///
/// # Limitations
///
/// The tape records one execution path. If `f` contains branches
/// (`if x > 0 { ... } else { ... }`), re-evaluating at inputs that take a
/// different branch produces **incorrect results**.
///
/// # Example
///
/// ```
/// let (mut tape, val) = hypergrad::record(|x| x[0] * x[0] + x[1] * x[1], &[3.0_f64, 4.0]);
/// assert!((val - 25.0).abs() < 1e-10);
///
/// let g = tape.gradient(&[3.0, 4.0]);
/// assert!((g[0] - 6.0).abs() < 1e-10);
/// assert!((g[1] - 8.0).abs() < 1e-10);
/// ```
pub fn record<F: Float + TapeThreadLocal>(
    f: impl FnOnce(&[Reverse<F>]) -> Reverse<F>,
    x: &[F],
) -> (Tape<F>, F) {
    let n = x.len();
    let mut tape = Tape::with_capacity(n * 10);

    // Register inputs first so they occupy tape slots 0..n.
    let inputs: Vec<Reverse<F>> = x
        .iter()
        .map(|&val| {
            let idx = tape.new_input(val);
            Reverse::from_tape(val, idx)
        })
        .collect();

    let guard = TapeGuard::new(&mut tape);
    let output = f(&inputs);
    drop(guard);

    let out_idx = if output.index() == crate::tape::CONSTANT {
        // Output independent of all inputs; keep it on tape so gradients are zero.
        tape.push_const(output.value())
    } else {
        output.index()
    };
    tape.set_output(out_idx);
    let value = output.value();
    (tape, value)
}

/// Compute the gradient of a scalar function `f : R^n → R` using reverse mode.
///
/// ```
/// let g = hypergrad::grad(|x| x[0] * x[1], &[2.0_f64, 3.0]);
/// assert!((g[0] - 3.0).abs() < 1e-10);
/// assert!((g[1] - 2.0).abs() < 1e-10);
/// ```
pub fn grad<F: Float + TapeThreadLocal + Scalar<Float = F>>(
    f: impl FnOnce(&[Reverse<F>]) -> Reverse<F>,
    x: &[F],
) -> Vec<F> {
    let (mut tape, _) = record(f, x);
    tape.gradient(x)
}

/// Hessian-vector product via forward-over-reverse.
///
/// Records `f`, then computes the gradient and Hessian-vector product at `x`
/// in direction `v`. Returns `(gradient, H·v)`, both of length `x.len()`.
pub fn hvp<F: Float + TapeThreadLocal>(
    f: impl FnOnce(&[Reverse<F>]) -> Reverse<F>,
    x: &[F],
    v: &[F],
) -> (Vec<F>, Vec<F>) {
    let (tape, _) = record(f, x);
    tape.hvp(x, v)
}
