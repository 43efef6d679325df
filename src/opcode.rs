//! Bytecode opcodes for the tape.
//!
//! Each opcode represents an elementary smooth operation. [`eval_forward`] and
//! [`reverse_partials`] evaluate / differentiate a single opcode, generic over
//! [`Scalar`] so the same code runs in primal and tangent-carrying sweeps.

use crate::scalar::Scalar;

/// Sentinel used in `arg_indices[1]` for unary ops (the second argument slot is unused).
pub const UNUSED: u32 = u32::MAX;

/// Elementary operation codes for the tape.
///
/// Binary ops use both `arg_indices` slots; unary ops use slot 0 only
/// (slot 1 = [`UNUSED`], except [`OpCode::Powi`] which stores the `i32`
/// exponent reinterpreted as `u32` in slot 1).
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    // ── Structural ──
    /// Input variable (leaf node).
    Input,
    /// Scalar constant.
    Const,

    // ── Binary arithmetic ──
    Add,
    Sub,
    Mul,
    Div,

    // ── Unary ──
    Neg,
    Recip,
    Sqrt,
    /// Integer power. Exponent stored in `arg_indices[1]` as `exp as u32`.
    Powi,
    Exp,
    Ln,
    Sin,
    Cos,
    Tanh,
}

/// Evaluate a single opcode in the forward direction.
///
/// For binary ops, `a` and `b` are the two operand values. For unary ops, `a`
/// is the operand and `b` is ignored. [`OpCode::Powi`] takes its exponent via
/// `powi_exp` (decoded by the caller from the argument slot).
#[inline]
pub fn eval_forward<T: Scalar>(op: OpCode, a: T, b: T, powi_exp: i32) -> T {
    match op {
        OpCode::Input | OpCode::Const => {
            // values are already set during tape setup
            unreachable!("Input/Const should not be re-evaluated via eval_forward")
        }

        OpCode::Add => a + b,
        OpCode::Sub => a - b,
        OpCode::Mul => a * b,
        OpCode::Div => a / b,

        OpCode::Neg => -a,
        OpCode::Recip => a.recip(),
        OpCode::Sqrt => a.sqrt(),
        OpCode::Powi => a.powi(powi_exp),
        OpCode::Exp => a.exp(),
        OpCode::Ln => a.ln(),
        OpCode::Sin => a.sin(),
        OpCode::Cos => a.cos(),
        OpCode::Tanh => a.tanh(),
    }
}

/// Compute reverse-mode partial derivatives for a single opcode.
///
/// Returns `(∂result/∂arg0, ∂result/∂arg1)`; for unary ops the second partial
/// is zero. `a`, `b` are the operand values and `r` is the result value, all
/// taken from the sweep's value buffer so duals carry second-order information.
#[inline]
pub fn reverse_partials<T: Scalar>(op: OpCode, a: T, b: T, r: T, powi_exp: i32) -> (T, T) {
    let zero = T::zero();
    let one = T::one();
    match op {
        OpCode::Input | OpCode::Const => (zero, zero),

        OpCode::Add => (one, one),
        OpCode::Sub => (one, -one),
        OpCode::Mul => (b, a),
        OpCode::Div => {
            let inv = one / b;
            (inv, -a * inv * inv)
        }

        OpCode::Neg => (-one, zero),
        OpCode::Recip => {
            let inv = one / a;
            (-inv * inv, zero)
        }
        OpCode::Sqrt => {
            let two = one + one;
            (one / (two * r), zero)
        }
        OpCode::Powi => {
            // x⁰ is constant; n·x⁻¹ would be NaN at x = 0.
            if powi_exp == 0 {
                return (zero, zero);
            }
            let n = T::from_f(<T::Float as num_traits::NumCast>::from(powi_exp).unwrap());
            (n * a.powi(powi_exp - 1), zero)
        }
        OpCode::Exp => (r, zero), // d/da e^a = e^a = r
        OpCode::Ln => (one / a, zero),
        OpCode::Sin => (a.cos(), zero),
        OpCode::Cos => (-a.sin(), zero),
        OpCode::Tanh => (one - r * r, zero),
    }
}

/// Encode a `powi` exponent as a value that can be stored in `arg_indices[1]`.
#[inline]
pub fn powi_exp_encode(exp: i32) -> u32 {
    exp as u32
}

/// Decode a `powi` exponent from `arg_indices[1]`.
#[inline]
pub fn powi_exp_decode(bits: u32) -> i32 {
    bits as i32
}
