//! Error types for hypergradient estimation.
//!
//! Only structurally impossible differentiation surfaces as an error; a single
//! parameter tensor with no gradient path is an expected condition handled by
//! the neutral-zero policy, and a mis-scaled `learning_rate` diverges silently
//! (choosing it consistently with the inner optimizer is the caller's
//! responsibility).

use thiserror::Error;

/// Errors surfaced by [`Hypergrad::grad`](crate::Hypergrad::grad).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HypergradError {
    /// The gradient of the training loss depends on no shared parameter —
    /// the loss is constant or linear in the whole shared block — so the
    /// Hessian-vector product at the heart of the fixed-point iteration is
    /// undefined for every parameter. This indicates a wiring bug in the
    /// surrounding training loop and must not be silently reported as zero.
    #[error("training loss gradient has no dependency on any shared parameter; the Hessian-vector product is undefined")]
    StructuralDependency,

    /// A tape's input count disagrees with the flattened parameter groups.
    #[error("{context} records {expected} inputs, but the parameter groups flatten to {got}")]
    LayoutMismatch {
        /// Which tape was mismatched ("validation tape" or "training tape").
        context: &'static str,
        /// Inputs the tape was recorded with.
        expected: usize,
        /// Total flattened parameter length supplied.
        got: usize,
    },
}
