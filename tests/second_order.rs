//! Tests for the tape engine: gradients, forward-over-reverse
//! Hessian-vector products, re-evaluation, and structural input usage.

use hypergrad::{record, Reverse};

// ── Gradients against known analytic forms ──

#[test]
fn gradient_sphere() {
    // f(x,y) = x² + y²  →  ∇f = [2x, 2y]
    let g = hypergrad::grad(|x| x[0] * x[0] + x[1] * x[1], &[3.0_f64, 4.0]);
    assert!((g[0] - 6.0_f64).abs() < 1e-10);
    assert!((g[1] - 8.0_f64).abs() < 1e-10);
}

#[test]
fn gradient_cross_term() {
    let g = hypergrad::grad(|x| x[0] * x[1], &[2.0_f64, 3.0]);
    assert!((g[0] - 3.0_f64).abs() < 1e-10);
    assert!((g[1] - 2.0_f64).abs() < 1e-10);
}

#[test]
fn gradient_unary_chain() {
    // f(x) = tanh(ln(sqrt(x)))
    // f'(x) = (1 - tanh(ln(√x))²) · 1/(2x)
    let x = 3.0_f64;
    let g = hypergrad::grad(|v| v[0].sqrt().ln().tanh(), &[x]);
    let t = x.sqrt().ln().tanh();
    let expected = (1.0 - t * t) / (2.0 * x);
    assert!((g[0] - expected).abs() < 1e-10, "{} vs {}", g[0], expected);
}

#[test]
fn gradient_recip() {
    // f(x) = 1/x  →  f'(x) = -1/x²
    let g = hypergrad::grad(|v| v[0].recip(), &[2.0_f64]);
    assert!((g[0] + 0.25).abs() < 1e-10);
}

// ── HVP against known analytic Hessians ──

#[test]
fn hvp_cross_term() {
    // H = [[0,1],[1,0]], v = [1,0] → H·v = [0, 1]
    let (grad, hv) = hypergrad::hvp(|x| x[0] * x[1], &[2.0_f64, 3.0], &[1.0_f64, 0.0]);
    assert!((grad[0] - 3.0_f64).abs() < 1e-10);
    assert!((grad[1] - 2.0_f64).abs() < 1e-10);
    assert!(hv[0].abs() < 1e-10);
    assert!((hv[1] - 1.0_f64).abs() < 1e-10);
}

#[test]
fn hvp_cubic_mixed() {
    // f(x,y) = x²y + y³,  H = [[2y, 2x], [2x, 6y]]
    let x = 1.5_f64;
    let y = 2.0_f64;
    let v = [0.7_f64, -0.3];
    let (grad, hv) = hypergrad::hvp(|w| w[0] * w[0] * w[1] + w[1] * w[1] * w[1], &[x, y], &v);

    assert!((grad[0] - 2.0 * x * y).abs() < 1e-10);
    assert!((grad[1] - (x * x + 3.0 * y * y)).abs() < 1e-10);
    assert!((hv[0] - (2.0 * y * v[0] + 2.0 * x * v[1])).abs() < 1e-10);
    assert!((hv[1] - (2.0 * x * v[0] + 6.0 * y * v[1])).abs() < 1e-10);
}

#[test]
fn powi_zero_exponent_is_constant() {
    // x⁰ ≡ 1; at x = 0 the partial must be an exact zero, not 0·0⁻¹ = NaN.
    let (mut tape, val) = record(|v| v[0].powi(0), &[0.0_f64]);
    assert_eq!(val, 1.0);

    let g = tape.gradient(&[0.0]);
    assert_eq!(g, vec![0.0]);

    let (grad, hv) = tape.hvp(&[0.0], &[1.0]);
    assert_eq!(grad, vec![0.0]);
    assert_eq!(hv, vec![0.0]);
}

#[test]
fn hvp_powi() {
    // f(x) = x⁴,  f''(x) = 12x²
    let x = 1.3_f64;
    let (grad, hv) = hypergrad::hvp(|v| v[0].powi(4), &[x], &[1.0_f64]);
    assert!((grad[0] - 4.0 * x.powi(3)).abs() < 1e-10);
    assert!((hv[0] - 12.0 * x * x).abs() < 1e-10);
}

// ── HVP against finite-difference gradient ──

fn finite_diff_hvp(
    tape: &mut hypergrad::Tape<f64>,
    x: &[f64],
    v: &[f64],
    h: f64,
) -> Vec<f64> {
    let n = x.len();
    let mut xp = x.to_vec();
    let mut xm = x.to_vec();
    for i in 0..n {
        xp[i] = x[i] + h * v[i];
        xm[i] = x[i] - h * v[i];
    }
    let gp = tape.gradient(&xp);
    let gm = tape.gradient(&xm);
    (0..n).map(|i| (gp[i] - gm[i]) / (2.0 * h)).collect()
}

#[test]
fn hvp_vs_finite_diff_sin_exp() {
    let x = [0.7_f64, 0.3];
    let v = [1.0_f64, 1.0];
    let (mut tape, _) = record(|v| v[0].sin() * v[1].exp(), &x);

    let (_, analytic_hv) = tape.hvp(&x, &v);
    let fd_hv = finite_diff_hvp(&mut tape, &x, &v, 1e-5);

    for i in 0..x.len() {
        assert!(
            (analytic_hv[i] - fd_hv[i]).abs() < 1e-4,
            "hvp vs fd, component {}: analytic={}, fd={}",
            i,
            analytic_hv[i],
            fd_hv[i]
        );
    }
}

fn rosenbrock(x: &[Reverse<f64>]) -> Reverse<f64> {
    let mut sum = Reverse::constant(0.0);
    for i in 0..x.len() - 1 {
        let t1 = 1.0 - x[i];
        let t2 = x[i + 1] - x[i] * x[i];
        sum = sum + t1 * t1 + 100.0 * t2 * t2;
    }
    sum
}

#[test]
fn hvp_vs_finite_diff_rosenbrock() {
    let x = [1.5_f64, 2.0];
    let v = [0.3_f64, 0.9];
    let (mut tape, _) = record(|v| rosenbrock(v), &x);

    let (_, analytic_hv) = tape.hvp(&x, &v);
    let fd_hv = finite_diff_hvp(&mut tape, &x, &v, 1e-5);

    for i in 0..x.len() {
        assert!(
            (analytic_hv[i] - fd_hv[i]).abs() < 1e-3,
            "hvp vs fd, component {}: analytic={}, fd={}",
            i,
            analytic_hv[i],
            fd_hv[i]
        );
    }
}

// ── Tape reuse: hvp takes &self, repeated products through one recording ──

#[test]
fn tape_reuse_hvp_columns() {
    let (tape, _) = record(|v| v[0] * v[0] * v[1] + v[1] * v[1] * v[1], &[1.0_f64, 1.0]);

    // H = [[2y, 2x],[2x, 6y]] at (1.5, 2.0); unit directions read out columns.
    let (g1, hv1) = tape.hvp(&[1.5_f64, 2.0], &[1.0_f64, 0.0]);
    let (g2, hv2) = tape.hvp(&[1.5_f64, 2.0], &[0.0_f64, 1.0]);

    for i in 0..2 {
        assert!((g1[i] - g2[i]).abs() < 1e-10);
    }
    assert!((hv1[0] - 4.0_f64).abs() < 1e-10);
    assert!((hv1[1] - 3.0_f64).abs() < 1e-10);
    assert!((hv2[0] - 3.0_f64).abs() < 1e-10);
    assert!((hv2[1] - 12.0_f64).abs() < 1e-10);
}

#[test]
fn gradient_from_hvp_matches_tape_gradient() {
    let x = [1.5_f64, 2.0];
    let (mut tape, _) = record(|v| rosenbrock(v), &x);

    let tape_grad = tape.gradient(&x);
    let (hvp_grad, _) = tape.hvp(&x, &[1.0_f64, 0.0]);

    for i in 0..x.len() {
        assert!((tape_grad[i] - hvp_grad[i]).abs() < 1e-10);
    }
}

// ── Re-evaluation without re-recording ──

#[test]
fn reevaluation_changes_gradient() {
    let (mut tape, _) = record(|v| v[0] * v[0] * v[0], &[1.0_f64]);

    let g1 = tape.gradient(&[1.0]);
    let g2 = tape.gradient(&[2.0]);
    assert!((g1[0] - 3.0_f64).abs() < 1e-10);
    assert!((g2[0] - 12.0_f64).abs() < 1e-10);
}

// ── Structural input usage ──

#[test]
fn input_usage_flags_disconnected_inputs() {
    // x[1] never reaches the output.
    let (tape, _) = record(|v| v[0] * v[0] + v[2], &[1.0_f64, 2.0, 3.0]);
    let usage = tape.input_usage();
    assert_eq!(usage, vec![true, false, true]);
}

#[test]
fn disconnected_input_gradient_is_exact_zero() {
    let (mut tape, _) = record(|v| v[0] * v[0] + v[2], &[1.0_f64, 2.0, 3.0]);
    let g = tape.gradient(&[1.0, 2.0, 3.0]);
    assert!((g[0] - 2.0_f64).abs() < 1e-10);
    assert_eq!(g[1], 0.0);
    assert!((g[2] - 1.0_f64).abs() < 1e-10);
}

#[test]
fn nonlinearity_classification() {
    // Linear in every input: structurally zero Hessian.
    let (tape, _) = record(|v| 3.0 * v[0] + v[1] - 2.0, &[1.0_f64, 2.0]);
    assert!(!tape.output_nonlinear_in(2));

    // Quadratic.
    let (tape, _) = record(|v| v[0] * v[0], &[1.0_f64]);
    assert!(tape.output_nonlinear_in(1));

    // Nonlinear unary of a dependent value.
    let (tape, _) = record(|v| v[0].sin(), &[1.0_f64]);
    assert!(tape.output_nonlinear_in(1));
}

#[test]
fn nonlinearity_is_relative_to_the_input_prefix() {
    // x·y is bilinear: linear in x alone, nonlinear over both inputs.
    let (tape, _) = record(|v| v[0] * v[1], &[1.0_f64, 2.0]);
    assert!(!tape.output_nonlinear_in(1));
    assert!(tape.output_nonlinear_in(2));

    // y² + x is nonlinear over both, but only linear in the first input.
    let (tape, _) = record(|v| v[1] * v[1] + v[0], &[1.0_f64, 2.0]);
    assert!(!tape.output_nonlinear_in(1));
    assert!(tape.output_nonlinear_in(2));
}

#[test]
fn constant_output_has_zero_gradient() {
    let (mut tape, val) = record(|_| hypergrad::Reverse::constant(42.0_f64), &[1.0, 2.0]);
    assert!((val - 42.0).abs() < 1e-12);
    let g = tape.gradient(&[5.0, 6.0]);
    assert_eq!(g, vec![0.0, 0.0]);
    assert_eq!(tape.input_usage(), vec![false, false]);
}

// ── f32 path ──

#[test]
fn gradient_and_hvp_f32() {
    let (grad, hv) = hypergrad::hvp(|x| x[0] * x[0] * x[1], &[1.5_f32, 2.0], &[1.0_f32, 0.0]);
    // ∇f = [2xy, x²], H·[1,0] = [2y, 2x]
    assert!((grad[0] - 6.0_f32).abs() < 1e-5);
    assert!((grad[1] - 2.25_f32).abs() < 1e-5);
    assert!((hv[0] - 4.0_f32).abs() < 1e-5);
    assert!((hv[1] - 3.0_f32).abs() < 1e-5);
}
