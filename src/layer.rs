//! Layer wrappers: locally trained layers and plain pass-through layers.

use candle_core::{Tensor, Var, D};
use candle_nn::Module;

use crate::activation::Activation;
use crate::error::{LocopropError, Result};

/// Default clipping epsilon for the activation pseudo-inverse.
pub const DEFAULT_EPS: f64 = 1e-5;

/// A trainable layer: a parametric transform followed by an elementwise
/// activation, locally optimized through its Bregman loss.
///
/// The wrapped module is opaque to the trainer; the layer additionally
/// carries the `Var`s backing the module's trainable parameters so a
/// per-layer optimizer can be built over exactly those.
///
/// With `implicit` set, `forward` returns the pre-activation instead of the
/// activated value - used when the next layer's loss already expects a
/// pre-activation (e.g. a softmax layer feeding a cross-entropy-on-logits
/// loss).
pub struct LocoLayer {
    module: Box<dyn Module>,
    params: Vec<Var>,
    activation: Activation,
    implicit: bool,
    eps: f64,
}

impl LocoLayer {
    /// Wrap `module` (with the `Var`s backing its parameters) and an
    /// activation. `implicit` defaults to false and the pseudo-inverse
    /// clipping epsilon to [`DEFAULT_EPS`].
    pub fn new(module: impl Module + 'static, params: Vec<Var>, activation: Activation) -> Self {
        Self {
            module: Box::new(module),
            params,
            activation,
            implicit: false,
            eps: DEFAULT_EPS,
        }
    }

    /// Return the pre-activation from `forward` instead of the activated
    /// value.
    #[must_use]
    pub fn with_implicit(mut self, implicit: bool) -> Self {
        self.implicit = implicit;
        self
    }

    /// Override the pseudo-inverse clipping epsilon.
    #[must_use]
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// The activation kind of this layer.
    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// The `Var`s backing the wrapped module's trainable parameters.
    pub fn params(&self) -> &[Var] {
        &self.params
    }

    /// Total number of trainable parameter elements.
    pub fn parameter_count(&self) -> usize {
        self.params.iter().map(|v| v.elem_count()).sum()
    }

    /// Forward pass from either an input or an already-computed
    /// pre-activation. Exactly one of the two is needed; when both are given
    /// the pre-activation wins. Fails with
    /// [`LocopropError::MissingForwardInput`] when both are omitted.
    pub fn forward(&self, input: Option<&Tensor>, pre_activation: Option<&Tensor>) -> Result<Tensor> {
        let pre = match (input, pre_activation) {
            (_, Some(pre)) => pre.clone(),
            (Some(x), None) => self.pre_activation(x)?,
            (None, None) => return Err(LocopropError::MissingForwardInput),
        };
        if self.implicit {
            Ok(pre)
        } else {
            Ok(self.activation.apply(&pre)?)
        }
    }

    /// Apply only the wrapped parametric transform, no activation.
    pub fn pre_activation(&self, input: &Tensor) -> Result<Tensor> {
        Ok(self.module.forward(input)?)
    }

    /// Estimate the pre-activation that would have produced `target`, via
    /// the activation's closed-form inverse clipped by this layer's epsilon.
    pub fn pseudo_inverse(&self, target: &Tensor) -> Result<Tensor> {
        Ok(self.activation.pseudo_inverse(target, self.eps)?)
    }

    /// Per-example Bregman divergence between this layer's pre-activation on
    /// `input` and the pseudo-inverted `target`:
    ///
    /// `D = F(pre) - F(a) - <activation(a), pre - a>`, `a = pseudo_inverse(target)`,
    ///
    /// reduced over all non-batch dimensions. Non-negative, zero when the
    /// pre-activation equals `a`, and convex in the pre-activation - this is
    /// the local loss minimized by the trainer's inner iterations.
    pub fn bregman_loss(&self, input: &Tensor, target: &Tensor) -> Result<Tensor> {
        let pre = self.pre_activation(input)?.flatten_from(1)?;
        let a = self
            .activation
            .pseudo_inverse(target, self.eps)?
            .flatten_from(1)?;
        let f_pre = self.activation.potential(&pre)?;
        let f_a = self.activation.potential(&a)?;
        let inner = (self.activation.apply(&a)? * (pre - &a)?)?.sum(D::Minus1)?;
        Ok(((f_pre - f_a)? - inner)?)
    }
}

/// Any other differentiable transform. Not touched by the trainer; a `Var`
/// list can still be attached so the trainer can detect parameters that
/// would silently never be updated.
pub struct PlainLayer {
    module: Box<dyn Module>,
    params: Vec<Var>,
}

impl PlainLayer {
    /// Wrap a parameter-free differentiable transform.
    pub fn new(module: impl Module + 'static) -> Self {
        Self {
            module: Box::new(module),
            params: Vec::new(),
        }
    }

    /// Wrap a transform together with the `Var`s backing its parameters.
    /// The trainer will warn that those parameters stay frozen.
    pub fn with_params(module: impl Module + 'static, params: Vec<Var>) -> Self {
        Self {
            module: Box::new(module),
            params,
        }
    }

    /// Total number of trainable parameter elements.
    pub fn parameter_count(&self) -> usize {
        self.params.iter().map(|v| v.elem_count()).sum()
    }

    /// Forward pass through the wrapped transform.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        Ok(self.module.forward(input)?)
    }
}
