//! Per-layer local optimizers.
//!
//! The trainer builds one optimizer per trainable layer from an
//! [`OptimizerSpec`]. RMSprop - the default local update rule - is
//! implemented here against the `candle_nn::optim::Optimizer` contract;
//! AdamW and SGD are wrapped from candle-nn.

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, SGD};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// RMSprop hyperparameters, matching the torch defaults the algorithm was
/// tuned with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParamsRmsProp {
    /// Base learning rate.
    pub lr: f64,
    /// Smoothing constant for the squared-gradient average.
    pub alpha: f64,
    /// Term added to the denominator after the square root.
    pub eps: f64,
    /// Momentum factor for the update buffer.
    pub momentum: f64,
}

impl Default for ParamsRmsProp {
    fn default() -> Self {
        Self {
            lr: 2e-5,
            alpha: 0.9,
            eps: 1e-6,
            momentum: 0.999,
        }
    }
}

struct VarRmsProp {
    var: Var,
    square_avg: Tensor,
    momentum_buf: Option<Tensor>,
}

/// RMSprop with momentum.
///
/// `square_avg = alpha * square_avg + (1 - alpha) * grad^2`, the update is
/// `grad / (sqrt(square_avg) + eps)` folded into the momentum buffer.
pub struct RmsProp {
    vars: Vec<VarRmsProp>,
    params: ParamsRmsProp,
}

impl Optimizer for RmsProp {
    type Config = ParamsRmsProp;

    fn new(vars: Vec<Var>, params: ParamsRmsProp) -> candle_core::Result<Self> {
        let vars = vars
            .into_iter()
            .map(|var| {
                let square_avg = Tensor::zeros(var.dims(), var.dtype(), var.device())?;
                Ok(VarRmsProp {
                    var,
                    square_avg,
                    momentum_buf: None,
                })
            })
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self { vars, params })
    }

    fn step(&mut self, grads: &GradStore) -> candle_core::Result<()> {
        for v in self.vars.iter_mut() {
            if let Some(grad) = grads.get(v.var.as_tensor()) {
                let square_avg = ((&v.square_avg * self.params.alpha)?
                    + (grad.sqr()? * (1.0 - self.params.alpha))?)?;
                let denom = (square_avg.sqrt()? + self.params.eps)?;
                let update = if self.params.momentum > 0.0 {
                    let buf = match &v.momentum_buf {
                        Some(buf) => ((buf * self.params.momentum)? + grad.div(&denom)?)?,
                        None => grad.div(&denom)?,
                    };
                    let update = (&buf * self.params.lr)?;
                    v.momentum_buf = Some(buf);
                    update
                } else {
                    (grad.div(&denom)? * self.params.lr)?
                };
                v.var.set(&(v.var.as_tensor() - update)?)?;
                v.square_avg = square_avg;
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }
}

/// AdamW hyperparameters (serializable mirror of candle's `ParamsAdamW`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdamWParams {
    /// Base learning rate.
    pub lr: f64,
    /// First-moment decay.
    pub beta1: f64,
    /// Second-moment decay.
    pub beta2: f64,
    /// Numerical stability epsilon.
    pub eps: f64,
    /// Decoupled weight decay.
    pub weight_decay: f64,
}

impl Default for AdamWParams {
    fn default() -> Self {
        Self {
            lr: 5e-5,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.01,
        }
    }
}

impl AdamWParams {
    fn to_candle(self) -> ParamsAdamW {
        ParamsAdamW {
            lr: self.lr,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
            weight_decay: self.weight_decay,
        }
    }
}

/// Serializable optimizer factory: determines the local update rule applied
/// to each trainable layer's parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerSpec {
    /// RMSprop with momentum (the default).
    RmsProp(ParamsRmsProp),
    /// AdamW.
    AdamW(AdamWParams),
    /// Plain stochastic gradient descent.
    Sgd {
        /// Learning rate.
        learning_rate: f64,
    },
}

impl Default for OptimizerSpec {
    fn default() -> Self {
        Self::RmsProp(ParamsRmsProp::default())
    }
}

impl OptimizerSpec {
    /// Build one optimizer instance over the given parameters.
    pub fn build(&self, vars: Vec<Var>) -> Result<LocalOptimizer> {
        match self {
            Self::RmsProp(params) => Ok(LocalOptimizer::RmsProp(RmsProp::new(vars, *params)?)),
            Self::AdamW(params) => Ok(LocalOptimizer::AdamW(AdamW::new(vars, params.to_candle())?)),
            Self::Sgd { learning_rate } => Ok(LocalOptimizer::Sgd(SGD::new(vars, *learning_rate)?)),
        }
    }
}

/// A per-layer optimizer instance, exclusively owned by the trainer.
pub enum LocalOptimizer {
    /// RMSprop with momentum.
    RmsProp(RmsProp),
    /// AdamW.
    AdamW(AdamW),
    /// Plain SGD.
    Sgd(SGD),
}

impl LocalOptimizer {
    /// Apply one update step from the given gradients.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        match self {
            Self::RmsProp(opt) => Ok(opt.step(grads)?),
            Self::AdamW(opt) => Ok(opt.step(grads)?),
            Self::Sgd(opt) => Ok(opt.step(grads)?),
        }
    }

    /// The base learning rate.
    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::RmsProp(opt) => opt.learning_rate(),
            Self::AdamW(opt) => opt.learning_rate(),
            Self::Sgd(opt) => opt.learning_rate(),
        }
    }

    /// Set the base learning rate.
    pub fn set_learning_rate(&mut self, lr: f64) {
        match self {
            Self::RmsProp(opt) => opt.set_learning_rate(lr),
            Self::AdamW(opt) => opt.set_learning_rate(lr),
            Self::Sgd(opt) => opt.set_learning_rate(lr),
        }
    }

    /// Apply one step at a caller-supplied learning rate, leaving the base
    /// rate in place afterwards. The per-iteration schedule stays a pure
    /// function of the caller's state.
    pub fn step_with_lr(&mut self, grads: &GradStore, lr: f64) -> Result<()> {
        let base = self.learning_rate();
        self.set_learning_rate(lr);
        let out = self.step(grads);
        self.set_learning_rate(base);
        out
    }
}
