//! Elementwise activations with their convex potentials and pseudo-inverses.
//!
//! Each supported activation is the gradient of a convex potential `F`; the
//! potential defines the Bregman divergence a [`crate::layer::LocoLayer`]
//! minimizes locally, and the pseudo-inverse maps a target in activation
//! output space back to an estimated pre-activation.

use candle_core::{Result, Tensor, D};
use serde::{Deserialize, Serialize};

/// The closed set of supported elementwise activations.
///
/// Selecting the potential and pseudo-inverse happens by enum match, resolved
/// once when a layer is built, so there is no per-call type inspection.
/// `Softmax` operates over the last dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// Logistic sigmoid.
    Sigmoid,
    /// Hyperbolic tangent.
    Tanh,
    /// Rectified linear unit.
    Relu,
    /// Softmax over the last dimension.
    Softmax,
}

impl Activation {
    /// Apply the activation elementwise (softmax: over the last dimension).
    pub fn apply(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            Self::Sigmoid => candle_nn::ops::sigmoid(xs),
            Self::Tanh => xs.tanh(),
            Self::Relu => xs.relu(),
            Self::Softmax => candle_nn::ops::softmax(xs, D::Minus1),
        }
    }

    /// The convex potential `F` whose gradient is this activation, reduced
    /// over the last dimension. Input shape `(batch, features)`, output
    /// shape `(batch,)`.
    pub fn potential(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            // Log-partition of the binary exponential family:
            // sum(x + log(1 + exp(-x))).
            Self::Sigmoid | Self::Tanh => {
                let softplus = (xs.neg()?.exp()? + 1.0)?.log()?;
                (xs + softplus)?.sum(D::Minus1)
            }
            Self::Relu => ((xs * xs.relu()?)? * 0.5)?.sum(D::Minus1),
            Self::Softmax => log_sum_exp(xs),
        }
    }

    /// Closed-form pseudo-inverse: estimate the pre-activation that would
    /// have produced `target`. Saturating kinds clip the target by `eps`
    /// before inverting; the softmax inverse is valid only for strictly
    /// positive targets.
    pub fn pseudo_inverse(&self, target: &Tensor, eps: f64) -> Result<Tensor> {
        match self {
            Self::Sigmoid => {
                let a = target.clamp(eps, 1.0 - eps)?;
                logit(&a)
            }
            Self::Tanh => {
                let a = ((target + 1.0)? * 0.5)?.clamp(eps, 1.0 - eps)?;
                logit(&a)? * 0.5
            }
            // ReLU is the identity on its own range.
            Self::Relu => target.relu(),
            Self::Softmax => target.log(),
        }
    }
}

/// log(a / (1 - a)) elementwise.
fn logit(a: &Tensor) -> Result<Tensor> {
    let one_minus = (a.neg()? + 1.0)?;
    a.div(&one_minus)?.log()
}

/// Numerically stable log-sum-exp over the last dimension.
fn log_sum_exp(xs: &Tensor) -> Result<Tensor> {
    let max = xs.max_keepdim(D::Minus1)?;
    let sum = xs.broadcast_sub(&max)?.exp()?.sum(D::Minus1)?;
    sum.log()? + max.squeeze(D::Minus1)?
}
