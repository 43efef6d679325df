//! Reverse-mode AD recording variable.
//!
//! [`Reverse<F>`] wraps a primal value and a tape index; every arithmetic
//! operation records an opcode to the thread-local active [`Tape`](crate::Tape).
//! Each operator records an opcode; re-evaluation and differentiation happen
//! later through the tape, not through this type.

use std::fmt::{self, Display};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::float::Float;
use crate::opcode::{OpCode, UNUSED};
use crate::tape::{self, Tape, TapeThreadLocal, CONSTANT};

/// Reverse-mode AD variable recording to the thread-local tape.
#[derive(Clone, Copy, Debug)]
pub struct Reverse<F: Float> {
    pub(crate) value: F,
    pub(crate) index: u32,
}

impl<F: Float> Reverse<F> {
    /// Create a constant (not tracked on tape until used in an operation).
    #[inline]
    pub fn constant(value: F) -> Self {
        Reverse {
            value,
            index: CONSTANT,
        }
    }

    /// Create from a tape allocation (internal use).
    #[inline]
    pub fn from_tape(value: F, index: u32) -> Self {
        Reverse { value, index }
    }

    /// Get the primal value.
    #[inline]
    pub fn value(&self) -> F {
        self.value
    }

    /// Get the tape index.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl<F: Float> Display for Reverse<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<F: Float> Default for Reverse<F> {
    fn default() -> Self {
        Reverse::constant(F::zero())
    }
}

/// Ensure a Reverse operand has a valid tape index. If it's a constant
/// (index == CONSTANT), promote it to a `Const` entry on the tape.
#[inline]
fn ensure_on_tape<F: Float>(x: &Reverse<F>, tape: &mut Tape<F>) -> u32 {
    if x.index == CONSTANT {
        tape.push_const(x.value)
    } else {
        x.index
    }
}

/// Record a binary op, promoting constants as needed.
#[inline]
fn binary_op<F: Float + TapeThreadLocal>(
    lhs: Reverse<F>,
    rhs: Reverse<F>,
    op: OpCode,
    value: F,
) -> Reverse<F> {
    let index = tape::with_active_tape(|t| {
        let li = ensure_on_tape(&lhs, t);
        let ri = ensure_on_tape(&rhs, t);
        t.push_op(op, li, ri, value)
    });
    Reverse { value, index }
}

/// Record a unary op, promoting constant as needed.
#[inline]
fn unary_op<F: Float + TapeThreadLocal>(x: Reverse<F>, op: OpCode, value: F) -> Reverse<F> {
    let index = tape::with_active_tape(|t| {
        let xi = ensure_on_tape(&x, t);
        t.push_op(op, xi, UNUSED, value)
    });
    Reverse { value, index }
}

// ── Unary math methods ──

impl<F: Float + TapeThreadLocal> Reverse<F> {
    #[inline]
    pub fn recip(self) -> Self {
        unary_op(self, OpCode::Recip, self.value.recip())
    }

    #[inline]
    pub fn sqrt(self) -> Self {
        unary_op(self, OpCode::Sqrt, self.value.sqrt())
    }

    #[inline]
    pub fn powi(self, n: i32) -> Self {
        let value = self.value.powi(n);
        let index = tape::with_active_tape(|t| {
            let xi = ensure_on_tape(&self, t);
            t.push_powi(xi, n, value)
        });
        Reverse { value, index }
    }

    #[inline]
    pub fn exp(self) -> Self {
        unary_op(self, OpCode::Exp, self.value.exp())
    }

    #[inline]
    pub fn ln(self) -> Self {
        unary_op(self, OpCode::Ln, self.value.ln())
    }

    #[inline]
    pub fn sin(self) -> Self {
        unary_op(self, OpCode::Sin, self.value.sin())
    }

    #[inline]
    pub fn cos(self) -> Self {
        unary_op(self, OpCode::Cos, self.value.cos())
    }

    #[inline]
    pub fn tanh(self) -> Self {
        unary_op(self, OpCode::Tanh, self.value.tanh())
    }
}

// ── Reverse<F> ↔ Reverse<F> operators ──

impl<F: Float + TapeThreadLocal> Add for Reverse<F> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        binary_op(self, rhs, OpCode::Add, self.value + rhs.value)
    }
}

impl<F: Float + TapeThreadLocal> Sub for Reverse<F> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        binary_op(self, rhs, OpCode::Sub, self.value - rhs.value)
    }
}

impl<F: Float + TapeThreadLocal> Mul for Reverse<F> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        binary_op(self, rhs, OpCode::Mul, self.value * rhs.value)
    }
}

impl<F: Float + TapeThreadLocal> Div for Reverse<F> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        binary_op(self, rhs, OpCode::Div, self.value / rhs.value)
    }
}

impl<F: Float + TapeThreadLocal> Neg for Reverse<F> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        unary_op(self, OpCode::Neg, -self.value)
    }
}

// Assign variants delegate to the binary ops.
impl<F: Float + TapeThreadLocal> AddAssign for Reverse<F> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<F: Float + TapeThreadLocal> SubAssign for Reverse<F> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<F: Float + TapeThreadLocal> MulAssign for Reverse<F> {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<F: Float + TapeThreadLocal> DivAssign for Reverse<F> {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

// ── Mixed ops: Reverse<F> with primitive floats ──

// The scalar side is promoted to a Const entry on the tape.
macro_rules! impl_reverse_scalar_ops {
    ($f:ty) => {
        impl Add<$f> for Reverse<$f> {
            type Output = Reverse<$f>;
            #[inline]
            fn add(self, rhs: $f) -> Reverse<$f> {
                binary_op(self, Reverse::constant(rhs), OpCode::Add, self.value + rhs)
            }
        }

        impl Add<Reverse<$f>> for $f {
            type Output = Reverse<$f>;
            #[inline]
            fn add(self, rhs: Reverse<$f>) -> Reverse<$f> {
                binary_op(Reverse::constant(self), rhs, OpCode::Add, self + rhs.value)
            }
        }

        impl Sub<$f> for Reverse<$f> {
            type Output = Reverse<$f>;
            #[inline]
            fn sub(self, rhs: $f) -> Reverse<$f> {
                binary_op(self, Reverse::constant(rhs), OpCode::Sub, self.value - rhs)
            }
        }

        impl Sub<Reverse<$f>> for $f {
            type Output = Reverse<$f>;
            #[inline]
            fn sub(self, rhs: Reverse<$f>) -> Reverse<$f> {
                binary_op(Reverse::constant(self), rhs, OpCode::Sub, self - rhs.value)
            }
        }

        impl Mul<$f> for Reverse<$f> {
            type Output = Reverse<$f>;
            #[inline]
            fn mul(self, rhs: $f) -> Reverse<$f> {
                binary_op(self, Reverse::constant(rhs), OpCode::Mul, self.value * rhs)
            }
        }

        impl Mul<Reverse<$f>> for $f {
            type Output = Reverse<$f>;
            #[inline]
            fn mul(self, rhs: Reverse<$f>) -> Reverse<$f> {
                binary_op(Reverse::constant(self), rhs, OpCode::Mul, self * rhs.value)
            }
        }

        impl Div<$f> for Reverse<$f> {
            type Output = Reverse<$f>;
            #[inline]
            fn div(self, rhs: $f) -> Reverse<$f> {
                binary_op(self, Reverse::constant(rhs), OpCode::Div, self.value / rhs)
            }
        }

        impl Div<Reverse<$f>> for $f {
            type Output = Reverse<$f>;
            #[inline]
            fn div(self, rhs: Reverse<$f>) -> Reverse<$f> {
                binary_op(Reverse::constant(self), rhs, OpCode::Div, self / rhs.value)
            }
        }
    };
}

impl_reverse_scalar_ops!(f32);
impl_reverse_scalar_ops!(f64);
