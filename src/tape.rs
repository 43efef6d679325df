//! Re-evaluable bytecode tape for reverse-mode AD.
//!
//! The tape stores opcodes rather than precomputed multipliers, so it can be
//! re-evaluated at different inputs without re-recording, and — crucially for
//! second-order products — its sweeps can run over tangent-carrying duals.
//! [`Tape::hvp`] takes `&self` and never consumes the recorded graph, which is
//! what lets a caller take repeated Hessian-vector products through the same
//! recorded function.
//!
//! # Limitations
//!
//! The tape records one execution path. If the recorded function contains
//! branches (`if x > 0 { ... } else { ... }`), re-evaluating at inputs that
//! take a different branch produces incorrect results.

use std::cell::Cell;

use crate::dual::Dual;
use crate::float::Float;
use crate::opcode::{self, OpCode, UNUSED};
use crate::scalar::Scalar;

/// Sentinel index for constant entries (not tracked).
pub const CONSTANT: u32 = u32::MAX;

/// A bytecode tape that can be re-evaluated at different inputs.
///
/// Created via [`crate::api::record`]. After recording, call
/// [`gradient`](Self::gradient) for first-order adjoints and
/// [`hvp`](Self::hvp) for forward-over-reverse Hessian-vector products.
pub struct Tape<F: Float> {
    opcodes: Vec<OpCode>,
    arg_indices: Vec<[u32; 2]>,
    values: Vec<F>,
    num_inputs: u32,
    num_variables: u32,
    output_index: u32,
}

impl<F: Float> Tape<F> {
    /// Create an empty tape.
    pub fn new() -> Self {
        Tape {
            opcodes: Vec::new(),
            arg_indices: Vec::new(),
            values: Vec::new(),
            num_inputs: 0,
            num_variables: 0,
            output_index: 0,
        }
    }

    /// Create a tape with pre-allocated capacity.
    pub fn with_capacity(est_ops: usize) -> Self {
        Tape {
            opcodes: Vec::with_capacity(est_ops),
            arg_indices: Vec::with_capacity(est_ops),
            values: Vec::with_capacity(est_ops),
            num_inputs: 0,
            num_variables: 0,
            output_index: 0,
        }
    }

    /// Register a new input variable. Returns its index.
    ///
    /// Inputs must be registered before any operation is recorded, so they
    /// occupy tape slots `0..num_inputs`.
    #[inline]
    pub fn new_input(&mut self, value: F) -> u32 {
        let idx = self.num_variables;
        self.num_variables += 1;
        self.num_inputs += 1;
        self.opcodes.push(OpCode::Input);
        self.arg_indices.push([UNUSED, UNUSED]);
        self.values.push(value);
        idx
    }

    /// Register a scalar constant. Returns its index.
    #[inline]
    pub fn push_const(&mut self, value: F) -> u32 {
        let idx = self.num_variables;
        self.num_variables += 1;
        self.opcodes.push(OpCode::Const);
        self.arg_indices.push([UNUSED, UNUSED]);
        self.values.push(value);
        idx
    }

    /// Record an operation. Returns the result index.
    ///
    /// **Constant folding**: if all operands point to `Const` entries (not
    /// `Input`), the operation is replaced by a single `Const` holding the
    /// already-computed value.
    #[inline]
    pub fn push_op(&mut self, op: OpCode, arg0: u32, arg1: u32, value: F) -> u32 {
        let arg0_const = self.opcodes[arg0 as usize] == OpCode::Const;
        let arg1_const = arg1 == UNUSED || self.opcodes[arg1 as usize] == OpCode::Const;
        if arg0_const && arg1_const {
            return self.push_const(value);
        }

        let idx = self.num_variables;
        self.num_variables += 1;
        self.opcodes.push(op);
        self.arg_indices.push([arg0, arg1]);
        self.values.push(value);
        idx
    }

    /// Record a powi operation. The `i32` exponent is stored in `arg_indices[1]`.
    #[inline]
    pub fn push_powi(&mut self, arg0: u32, exp: i32, value: F) -> u32 {
        if self.opcodes[arg0 as usize] == OpCode::Const {
            return self.push_const(value);
        }
        // x^1 → x
        if exp == 1 {
            return arg0;
        }

        let idx = self.num_variables;
        self.num_variables += 1;
        self.opcodes.push(OpCode::Powi);
        self.arg_indices.push([arg0, opcode::powi_exp_encode(exp)]);
        self.values.push(value);
        idx
    }

    /// Mark the output variable.
    #[inline]
    pub fn set_output(&mut self, index: u32) {
        self.output_index = index;
    }

    /// Get the output value (available after `forward()` or initial recording).
    #[inline]
    pub fn output_value(&self) -> F {
        self.values[self.output_index as usize]
    }

    /// Number of input variables.
    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.num_inputs as usize
    }

    /// Number of tape entries (inputs + constants + operations).
    #[inline]
    pub fn num_ops(&self) -> usize {
        self.opcodes.len()
    }

    // ── Forward evaluation ──

    /// Re-evaluate the tape at new inputs (forward sweep).
    ///
    /// Overwrites the cached primal values in place — no allocation. This is
    /// the only method that mutates the tape; the recorded graph itself is
    /// never consumed.
    pub fn forward(&mut self, inputs: &[F])
    where
        F: Scalar<Float = F>,
    {
        assert_eq!(
            inputs.len(),
            self.num_inputs as usize,
            "wrong number of inputs"
        );

        for (i, &v) in inputs.iter().enumerate() {
            self.values[i] = v;
        }

        for i in 0..self.opcodes.len() {
            match self.opcodes[i] {
                OpCode::Input | OpCode::Const => continue,
                op => {
                    let [a_idx, b_idx] = self.arg_indices[i];
                    let a = self.values[a_idx as usize];
                    let (b, exp) = self.operand_b(op, b_idx, &self.values);
                    self.values[i] = opcode::eval_forward(op, a, b, exp);
                }
            }
        }
    }

    /// Forward sweep over an arbitrary scalar type, writing into `buf`.
    ///
    /// Does not mutate the tape. With `T = Dual<F>` this carries a tangent
    /// through the whole computation (the forward half of an HVP).
    pub fn forward_sweep<T: Scalar<Float = F>>(&self, inputs: &[T], buf: &mut Vec<T>) {
        assert_eq!(
            inputs.len(),
            self.num_inputs as usize,
            "wrong number of inputs"
        );

        let n = self.num_variables as usize;
        buf.clear();
        buf.resize(n, T::zero());

        for i in 0..self.opcodes.len() {
            match self.opcodes[i] {
                OpCode::Input => buf[i] = inputs[i],
                OpCode::Const => buf[i] = T::from_f(self.values[i]),
                op => {
                    let [a_idx, b_idx] = self.arg_indices[i];
                    let a = buf[a_idx as usize];
                    let (b, exp) = self.operand_b(op, b_idx, buf);
                    buf[i] = opcode::eval_forward(op, a, b, exp);
                }
            }
        }
    }

    // ── Reverse sweeps ──

    /// Reverse sweep seeded with 1 at the output, reading primal values from
    /// `values` and writing adjoints into `buf`.
    ///
    /// With `T = Dual<F>` the adjoints carry tangents: `buf[i].eps` is then a
    /// Hessian-vector product component (the reverse half of forward-over-reverse).
    pub fn reverse_sweep<T: Scalar<Float = F>>(&self, values: &[T], buf: &mut Vec<T>) {
        let n = self.num_variables as usize;
        buf.clear();
        buf.resize(n, T::zero());
        buf[self.output_index as usize] = T::one();

        for i in (0..self.opcodes.len()).rev() {
            match self.opcodes[i] {
                OpCode::Input | OpCode::Const => continue,
                op => {
                    let adj = buf[i];
                    if adj.is_all_zero() {
                        continue;
                    }
                    buf[i] = T::zero();

                    let [a_idx, b_idx] = self.arg_indices[i];
                    let a = values[a_idx as usize];
                    let (b, exp) = self.operand_b(op, b_idx, values);
                    let r = values[i];
                    let (da, db) = opcode::reverse_partials(op, a, b, r, exp);

                    buf[a_idx as usize] = buf[a_idx as usize] + da * adj;
                    if b_idx != UNUSED && op != OpCode::Powi {
                        buf[b_idx as usize] = buf[b_idx as usize] + db * adj;
                    }
                }
            }
        }
    }

    /// Forward + reverse: compute the gradient at new inputs.
    ///
    /// Returns only the input adjoints (indices `0..num_inputs`). Inputs that
    /// do not reach the output receive an exact zero.
    pub fn gradient(&mut self, inputs: &[F]) -> Vec<F>
    where
        F: Scalar<Float = F>,
    {
        self.forward(inputs);
        let mut adjoints = Vec::new();
        self.reverse_sweep(&self.values, &mut adjoints);
        adjoints[..self.num_inputs as usize].to_vec()
    }

    // ── Forward-over-reverse (second-order) ──

    /// Hessian-vector product via forward-over-reverse.
    ///
    /// Returns `(gradient, H·v)`, both of length [`num_inputs`](Self::num_inputs).
    /// The tape is not mutated, so repeated products through the same recorded
    /// graph are free of re-recording.
    pub fn hvp(&self, x: &[F], v: &[F]) -> (Vec<F>, Vec<F>) {
        let mut dual_vals = Vec::new();
        let mut adjoint_buf = Vec::new();
        self.hvp_with_buf(x, v, &mut dual_vals, &mut adjoint_buf)
    }

    /// Like [`hvp`](Self::hvp) but reuses caller-provided buffers to avoid
    /// allocation on repeated calls (e.g. inside the fixed-point iteration).
    pub fn hvp_with_buf(
        &self,
        x: &[F],
        v: &[F],
        dual_vals_buf: &mut Vec<Dual<F>>,
        adjoint_buf: &mut Vec<Dual<F>>,
    ) -> (Vec<F>, Vec<F>) {
        let n = self.num_inputs as usize;
        assert_eq!(x.len(), n, "wrong number of inputs");
        assert_eq!(v.len(), n, "wrong number of directions");

        let dual_inputs: Vec<Dual<F>> = x
            .iter()
            .zip(v.iter())
            .map(|(&xi, &vi)| Dual::new(xi, vi))
            .collect();

        self.forward_sweep(&dual_inputs, dual_vals_buf);
        self.reverse_sweep(dual_vals_buf, adjoint_buf);

        let gradient: Vec<F> = (0..n).map(|i| adjoint_buf[i].re).collect();
        let hvp: Vec<F> = (0..n).map(|i| adjoint_buf[i].eps).collect();
        (gradient, hvp)
    }

    // ── Structural dependency ──

    /// Which inputs are structurally reachable from the output.
    ///
    /// An input with no path to the output has no gradient at all — as opposed
    /// to a gradient that happens to be numerically zero. Callers use this to
    /// distinguish "disconnected from the graph" (neutral-zero policy) from a
    /// missing dependency that indicates a wiring bug.
    pub fn input_usage(&self) -> Vec<bool> {
        let n = self.num_variables as usize;
        let mut reach = vec![false; n];
        reach[self.output_index as usize] = true;

        for i in (0..self.opcodes.len()).rev() {
            if !reach[i] {
                continue;
            }
            match self.opcodes[i] {
                OpCode::Input | OpCode::Const => {}
                op => {
                    let [a_idx, b_idx] = self.arg_indices[i];
                    reach[a_idx as usize] = true;
                    if b_idx != UNUSED && op != OpCode::Powi {
                        reach[b_idx as usize] = true;
                    }
                }
            }
        }

        reach[..self.num_inputs as usize].to_vec()
    }

    /// Whether the output is a structurally nonlinear function of the first
    /// `first_inputs` inputs.
    ///
    /// Classifies every node as constant, linear, or nonlinear in those
    /// inputs (treating all later inputs as constants) and reads off the
    /// output's class. A linear or constant output has a structurally zero
    /// Hessian block over those inputs, so its gradient cannot depend on
    /// them — no cancellation analysis is attempted, only graph structure.
    pub fn output_nonlinear_in(&self, first_inputs: usize) -> bool {
        #[derive(Clone, Copy, PartialEq, PartialOrd)]
        enum Degree {
            Constant,
            Linear,
            Nonlinear,
        }

        let mut degree = vec![Degree::Constant; self.num_variables as usize];
        for i in 0..self.opcodes.len() {
            let [a_idx, b_idx] = self.arg_indices[i];
            degree[i] = match self.opcodes[i] {
                OpCode::Input => {
                    if i < first_inputs {
                        Degree::Linear
                    } else {
                        Degree::Constant
                    }
                }
                OpCode::Const => Degree::Constant,
                OpCode::Add | OpCode::Sub => {
                    let a = degree[a_idx as usize];
                    let b = degree[b_idx as usize];
                    if a > b {
                        a
                    } else {
                        b
                    }
                }
                OpCode::Neg => degree[a_idx as usize],
                OpCode::Mul => {
                    let a = degree[a_idx as usize];
                    let b = degree[b_idx as usize];
                    if a == Degree::Constant {
                        b
                    } else if b == Degree::Constant {
                        a
                    } else {
                        Degree::Nonlinear
                    }
                }
                OpCode::Div => {
                    if degree[b_idx as usize] == Degree::Constant {
                        degree[a_idx as usize]
                    } else {
                        Degree::Nonlinear
                    }
                }
                OpCode::Powi => match opcode::powi_exp_decode(b_idx) {
                    0 => Degree::Constant,
                    1 => degree[a_idx as usize],
                    _ => {
                        if degree[a_idx as usize] == Degree::Constant {
                            Degree::Constant
                        } else {
                            Degree::Nonlinear
                        }
                    }
                },
                OpCode::Recip
                | OpCode::Sqrt
                | OpCode::Exp
                | OpCode::Ln
                | OpCode::Sin
                | OpCode::Cos
                | OpCode::Tanh => {
                    if degree[a_idx as usize] == Degree::Constant {
                        Degree::Constant
                    } else {
                        Degree::Nonlinear
                    }
                }
            };
        }

        degree[self.output_index as usize] == Degree::Nonlinear
    }

    /// Fetch the second operand for `op` from `buf`, handling unary ops and
    /// the `Powi` exponent slot. Returns `(b, powi_exp)`.
    #[inline]
    fn operand_b<T: Scalar<Float = F>>(&self, op: OpCode, b_idx: u32, buf: &[T]) -> (T, i32) {
        if op == OpCode::Powi {
            (T::zero(), opcode::powi_exp_decode(b_idx))
        } else if b_idx != UNUSED {
            (buf[b_idx as usize], 0)
        } else {
            (T::zero(), 0)
        }
    }
}

impl<F: Float> Default for Tape<F> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Thread-local active tape ──

thread_local! {
    static TAPE_F32: Cell<*mut Tape<f32>> = const { Cell::new(std::ptr::null_mut()) };
    static TAPE_F64: Cell<*mut Tape<f64>> = const { Cell::new(std::ptr::null_mut()) };
}

/// Trait to select the correct thread-local for a given float type.
pub trait TapeThreadLocal: Float {
    fn tape_cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>>;
}

impl TapeThreadLocal for f32 {
    fn tape_cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F32
    }
}

impl TapeThreadLocal for f64 {
    fn tape_cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F64
    }
}

/// Access the active tape for the current thread.
/// Panics if no tape is active.
#[inline]
pub fn with_active_tape<F: TapeThreadLocal, R>(f: impl FnOnce(&mut Tape<F>) -> R) -> R {
    F::tape_cell().with(|cell| {
        let ptr = cell.get();
        assert!(
            !ptr.is_null(),
            "No active tape. Use hypergrad::record() to record a function."
        );
        // SAFETY: TapeGuard guarantees validity for the duration of the
        // recording scope, single-threaded via thread-local.
        let tape = unsafe { &mut *ptr };
        f(tape)
    })
}

/// RAII guard that sets a tape as the thread-local active tape.
pub struct TapeGuard<F: TapeThreadLocal> {
    prev: *mut Tape<F>,
}

impl<F: TapeThreadLocal> TapeGuard<F> {
    /// Activate `tape` as the thread-local tape.
    pub fn new(tape: &mut Tape<F>) -> Self {
        let prev = F::tape_cell().with(|cell| {
            let prev = cell.get();
            cell.set(tape as *mut Tape<F>);
            prev
        });
        TapeGuard { prev }
    }
}

impl<F: TapeThreadLocal> Drop for TapeGuard<F> {
    fn drop(&mut self) {
        F::tape_cell().with(|cell| {
            cell.set(self.prev);
        });
    }
}
