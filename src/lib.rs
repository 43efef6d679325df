//! Hypergradients for auxiliary parameters via implicit differentiation.
//!
//! Bilevel training loops tune auxiliary parameters (task weights, data
//! weights, regularization strengths) that affect the validation loss only
//! through the shared parameters the inner loop optimizes. This crate
//! estimates the gradient of the validation loss with respect to those
//! auxiliary parameters without materializing or inverting a Hessian: the
//! implicit function theorem reduces the hypergradient to an inverse
//! Hessian-vector product, which [`Hypergrad`] approximates with a truncated
//! Neumann fixed-point iteration over plain Hessian-vector products.
//!
//! The second-order products come from an embedded re-evaluable bytecode
//! tape: [`record`] traces a scalar closure once, and [`Tape::hvp`] runs a
//! dual-number forward sweep followed by a dual-valued reverse sweep through
//! the recorded graph (forward-over-reverse), never consuming it.
//!
//! # Example
//!
//! ```
//! use hypergrad::{record, Hypergrad};
//!
//! // Inner problem: train loss a·w² over shared w, weighted by auxiliary a.
//! // Outer problem: validation loss w² over w alone.
//! let w = [2.0_f64];
//! let a = [0.5_f64];
//!
//! let (mut loss_val, _) = record(|x| x[0] * x[0], &w);
//! let joint: Vec<f64> = w.iter().chain(a.iter()).copied().collect();
//! let (train_loss, _) = record(|x| x[1] * x[0] * x[0], &joint);
//!
//! let estimator = Hypergrad::new(0.1, 3);
//! let hyper = estimator
//!     .grad(&mut loss_val, &train_loss, &[a.to_vec()], &[w.to_vec()])
//!     .unwrap();
//! assert_eq!(hyper.len(), 1);
//! assert_eq!(hyper[0].len(), 1);
//! ```

pub mod api;
pub mod dual;
pub mod error;
pub mod float;
pub mod hypergrad;
pub mod opcode;
pub mod reverse;
pub mod scalar;
pub mod tape;

pub use api::{grad, hvp, record};
pub use dual::Dual;
pub use error::HypergradError;
pub use float::Float;
pub use hypergrad::Hypergrad;
pub use reverse::Reverse;
pub use scalar::Scalar;
pub use tape::{Tape, TapeGuard, TapeThreadLocal};
