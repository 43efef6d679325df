//! Constant-memory hypergradient estimation via implicit differentiation.
//!
//! [`Hypergrad`] estimates the gradient of a validation loss with respect to
//! auxiliary parameters that influence it only indirectly, through the shared
//! parameters the training loss is minimized over. The inverse Hessian that
//! the implicit function theorem calls for is approximated by a truncated
//! Neumann fixed-point iteration, so the whole estimate costs `truncate_iter
//! + 1` Hessian-vector products and memory proportional to one parameter
//! vector, independent of the truncation depth.

use crate::dual::Dual;
use crate::error::HypergradError;
use crate::float::Float;
use crate::scalar::Scalar;
use crate::tape::Tape;

/// Truncated-Neumann hypergradient estimator.
///
/// `learning_rate` must match the step size of the inner optimizer updating
/// the shared parameters; the fixed point being differentiated through is the
/// inner SGD update itself, and a mismatched scale silently degrades (or
/// diverges) the series. `truncate_iter` trades bias for Hessian-vector
/// products: each extra term adds one product and shrinks the truncation
/// error by a factor of the spectral radius of `I - lr·H`.
#[derive(Clone, Copy, Debug)]
pub struct Hypergrad<F: Float> {
    learning_rate: F,
    truncate_iter: usize,
}

impl<F: Float> Hypergrad<F> {
    /// Create an estimator with the given inner learning rate and truncation
    /// depth.
    ///
    /// # Panics
    ///
    /// Panics if `learning_rate` is not strictly positive or `truncate_iter`
    /// is zero. A zero-term series would return the raw validation gradient,
    /// which is never what a caller asking for an implicit gradient wants.
    pub fn new(learning_rate: F, truncate_iter: usize) -> Self {
        assert!(
            learning_rate > F::zero(),
            "learning_rate must be strictly positive"
        );
        assert!(truncate_iter >= 1, "truncate_iter must be at least 1");
        Hypergrad {
            learning_rate,
            truncate_iter,
        }
    }

    /// The inner learning rate the series is scaled by.
    #[inline]
    pub fn learning_rate(&self) -> F {
        self.learning_rate
    }

    /// Number of fixed-point iterations (Neumann terms beyond the zeroth).
    #[inline]
    pub fn truncate_iter(&self) -> usize {
        self.truncate_iter
    }

    /// Estimate the hypergradient of the validation loss with respect to the
    /// auxiliary parameters.
    ///
    /// `loss_val` is recorded over the shared parameters alone; `train_loss`
    /// is recorded over `[shared..., aux...]` in that order. Both tapes are
    /// evaluated at the supplied parameter values, so neither needs to have
    /// been recorded at the current iterate. The training tape is only read —
    /// repeated second-order products reuse the same recorded graph.
    ///
    /// Returns one gradient per auxiliary parameter group, shaped like
    /// `aux_params`. An auxiliary group with no path into the training loss
    /// receives an exact zero gradient; shared groups absent from the
    /// validation loss contribute an exact zero seed to the series. Only a
    /// training loss whose gradient depends on *no* shared parameter (the
    /// loss is constant or linear in the shared block) is an error.
    pub fn grad(
        &self,
        loss_val: &mut Tape<F>,
        train_loss: &Tape<F>,
        aux_params: &[Vec<F>],
        shared_params: &[Vec<F>],
    ) -> Result<Vec<Vec<F>>, HypergradError>
    where
        F: Scalar<Float = F>,
    {
        let m: usize = shared_params.iter().map(Vec::len).sum();
        let k: usize = aux_params.iter().map(Vec::len).sum();

        if loss_val.num_inputs() != m {
            return Err(HypergradError::LayoutMismatch {
                context: "validation tape",
                expected: loss_val.num_inputs(),
                got: m,
            });
        }
        if train_loss.num_inputs() != m + k {
            return Err(HypergradError::LayoutMismatch {
                context: "training tape",
                expected: train_loss.num_inputs(),
                got: m + k,
            });
        }

        // The series differentiates the training gradient with respect to the
        // shared block, so that gradient must itself depend on a shared
        // parameter: a training loss constant or linear in the shared block
        // has a structurally zero Hessian and the product is undefined.
        let train_usage = train_loss.input_usage();
        if !train_loss.output_nonlinear_in(m) {
            return Err(HypergradError::StructuralDependency);
        }

        // Joint evaluation point [shared..., aux...].
        let mut x = Vec::with_capacity(m + k);
        for group in shared_params {
            x.extend_from_slice(group);
        }
        for group in aux_params {
            x.extend_from_slice(group);
        }

        // Stage 1: dL_val/dW, with disconnected shared groups seeded as
        // exact zeros rather than whatever the sweep left behind.
        let raw = loss_val.gradient(&x[..m]);
        let val_usage = loss_val.input_usage();
        let d = flatten_connected(&raw, &val_usage, shared_params);

        // Stage 2: truncated Neumann series for H^{-1}·d (up to the 1/lr
        // factor absorbed by the inner update). The recurrence is
        //   g := lr·(H·v),  v := v − g,  p := p + v
        // starting from p = v = d, so after T iterations
        //   p = Σ_{j=0}^{T} (I − lr·H)^j · d.
        let mut v = d.clone();
        let mut p = d;
        let mut dir = vec![<F as Scalar>::zero(); m + k];
        let mut dual_buf: Vec<Dual<F>> = Vec::new();
        let mut adjoint_buf: Vec<Dual<F>> = Vec::new();
        for _ in 0..self.truncate_iter {
            dir[..m].copy_from_slice(&v);
            let (_, hv) = train_loss.hvp_with_buf(&x, &dir, &mut dual_buf, &mut adjoint_buf);
            for i in 0..m {
                let g = self.learning_rate * hv[i];
                v[i] = v[i] - g;
                p[i] = p[i] + v[i];
            }
        }

        // Stage 3: mixed second-order term. The same joint product, seeded
        // with [p; 0], yields the auxiliary block ∂(dL_train/dW)/dφ · p.
        dir[..m].copy_from_slice(&p);
        let (_, hv) = train_loss.hvp_with_buf(&x, &dir, &mut dual_buf, &mut adjoint_buf);

        // Negate connected groups; disconnected auxiliary groups get exact
        // zeros, mirroring the neutral-zero policy for absent dependencies.
        let mut out = Vec::with_capacity(aux_params.len());
        let mut offset = m;
        for group in aux_params {
            let len = group.len();
            let connected = train_usage[offset..offset + len].iter().any(|&u| u);
            if connected {
                out.push(hv[offset..offset + len].iter().map(|&g| -g).collect());
            } else {
                out.push(vec![<F as Scalar>::zero(); len]);
            }
            offset += len;
        }
        Ok(out)
    }
}

impl<F: Float> Default for Hypergrad<F> {
    /// Learning rate 0.1 and three Neumann terms, a conservative default for
    /// inner SGD loops in that range.
    fn default() -> Self {
        Hypergrad {
            learning_rate: F::from_f64(0.1).unwrap_or_else(F::one),
            truncate_iter: 3,
        }
    }
}

/// Flatten a gradient, replacing groups with no structural path to the
/// output by exact zeros.
fn flatten_connected<F: Float>(raw: &[F], usage: &[bool], groups: &[Vec<F>]) -> Vec<F> {
    let mut out = Vec::with_capacity(raw.len());
    let mut offset = 0;
    for group in groups {
        let len = group.len();
        if usage[offset..offset + len].iter().any(|&u| u) {
            out.extend_from_slice(&raw[offset..offset + len]);
        } else {
            out.extend(std::iter::repeat(F::zero()).take(len));
        }
        offset += len;
    }
    out
}
