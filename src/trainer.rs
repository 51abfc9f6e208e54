//! The LocoProp trainer: one global backward pass, then per-layer local
//! Bregman optimization.
//!
//! Each call to [`LocopropTrainer::step`] runs the model forward once while
//! capturing every optimized layer's pre-activation, harvests all
//! hidden-state gradients from a single backward pass, smooths them across
//! steps, and then visits the layers in order: build an activation-space
//! target from the smoothed gradient, take several local optimizer steps on
//! the layer's Bregman loss against that target, and nudge the next layer's
//! recorded input toward the layer's post-update output.

use candle_core::{Tensor, Var};

use crate::config::LocopropConfig;
use crate::error::{LocopropError, Result};
use crate::model::{Layer, Sequential};
use crate::optimizer::LocalOptimizer;

/// Scalar loss over (model output, label), differentiable through candle.
pub type LossFn = Box<dyn Fn(&Tensor, &Tensor) -> candle_core::Result<Tensor> + Send>;

/// Structured diagnostic emitted during trainer construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Index of the layer the diagnostic refers to.
    pub layer_index: usize,
    /// What was observed.
    pub kind: DiagnosticKind,
}

/// Kinds of construction diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A layer carries trainable parameters but is not a `LocoLayer`; its
    /// parameters will never be updated by the trainer.
    FrozenParameters {
        /// Number of parameter elements left frozen.
        parameter_count: usize,
    },
}

/// Layer-local trainer over a [`Sequential`] model.
///
/// Owns one optimizer slot and one gradient-EMA slot per layer, aligned by
/// index with the model's layer list. Both are mutated only by [`step`];
/// `step` must run to completion before another call reuses them.
///
/// [`step`]: LocopropTrainer::step
pub struct LocopropTrainer {
    model: Sequential,
    loss_fn: LossFn,
    config: LocopropConfig,
    opts: Vec<Option<LocalOptimizer>>,
    grads: Vec<Option<Tensor>>,
    diagnostics: Vec<Diagnostic>,
    losses: Vec<f32>,
    step: u64,
}

impl LocopropTrainer {
    /// Build a trainer over `model`.
    ///
    /// One optimizer is created per layer that both is a `LocoLayer` and has
    /// trainable parameters. Any other layer with trainable parameters gets
    /// no slot and produces a non-fatal [`Diagnostic`] (also logged as a
    /// warning): its parameters are frozen from the trainer's perspective.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is out of range or an optimizer
    /// cannot be built.
    pub fn new<F>(model: Sequential, loss_fn: F, config: LocopropConfig) -> Result<Self>
    where
        F: Fn(&Tensor, &Tensor) -> candle_core::Result<Tensor> + Send + 'static,
    {
        config.validate()?;

        let mut opts = Vec::with_capacity(model.len());
        let mut diagnostics = Vec::new();
        for (index, layer) in model.layers().iter().enumerate() {
            let parameter_count = layer.parameter_count();
            match layer {
                Layer::Loco(loco) if parameter_count > 0 => {
                    opts.push(Some(config.optimizer.build(loco.params().to_vec())?));
                }
                Layer::Loco(_) => opts.push(None),
                Layer::Plain(_) => {
                    if parameter_count > 0 {
                        tracing::warn!(
                            layer = index,
                            parameters = parameter_count,
                            "layer is trainable but not a LocoLayer; its parameters will not be updated"
                        );
                        diagnostics.push(Diagnostic {
                            layer_index: index,
                            kind: DiagnosticKind::FrozenParameters { parameter_count },
                        });
                    }
                    opts.push(None);
                }
            }
        }

        tracing::info!(
            layers = model.len(),
            optimizers = opts.iter().filter(|o| o.is_some()).count(),
            variant = ?config.variant,
            "locoprop trainer ready"
        );

        Ok(Self {
            model,
            loss_fn: Box::new(loss_fn),
            config,
            opts,
            grads: Vec::new(),
            diagnostics,
            losses: Vec::new(),
            step: 0,
        })
    }

    /// Execute one global training step and return the global scalar loss
    /// (pre-local-optimization) for monitoring.
    ///
    /// # Errors
    ///
    /// Fails with [`LocopropError::InconsistentOptimizerSlot`] if an
    /// optimizer slot does not line up with a `LocoLayer`, or with a candle
    /// error from the tensor work.
    pub fn step(&mut self, input: &Tensor, target: &Tensor) -> Result<f32> {
        self.step += 1;
        let n = self.model.len();

        // Global forward with hidden capture. Each optimized layer's
        // pre-activation gets a zero gradient tap added to it: GradStore
        // keeps gradients for Vars, so the tap's gradient after the single
        // backward pass is the hidden-state gradient, while the forward
        // chain stays connected through every layer.
        let mut inps: Vec<Tensor> = Vec::with_capacity(n);
        let mut taps: Vec<Option<Var>> = Vec::with_capacity(n);
        let mut curr = input.clone();
        for (layer, opt) in self.model.layers().iter().zip(self.opts.iter()) {
            inps.push(curr.detach());
            match (layer, opt) {
                (Layer::Loco(loco), Some(_)) => {
                    let pre = loco.pre_activation(&curr)?;
                    let tap = Var::zeros(pre.dims(), pre.dtype(), pre.device())
                        .map_err(LocopropError::from)?;
                    let hidden = pre.add(tap.as_tensor()).map_err(LocopropError::from)?;
                    curr = loco.forward(None, Some(&hidden))?;
                    taps.push(Some(tap));
                }
                _ => {
                    curr = layer.forward(&curr)?;
                    taps.push(None);
                }
            }
        }

        // Single global backward pass.
        let loss = (self.loss_fn)(&curr, target).map_err(LocopropError::from)?;
        let loss_value = loss.to_scalar::<f32>().map_err(LocopropError::from)?;
        let grad_store = loss.backward().map_err(LocopropError::from)?;
        let fresh: Vec<Option<Tensor>> = taps
            .iter()
            .map(|tap| {
                tap.as_ref()
                    .and_then(|t| grad_store.get(t.as_tensor()).cloned())
            })
            .collect();

        smooth_gradients(&mut self.grads, fresh, self.config.momentum, self.step)?;

        // Per-layer local optimization, in layer order.
        for index in 0..n {
            if self.opts[index].is_none() {
                continue;
            }
            let Layer::Loco(layer) = &self.model.layers()[index] else {
                return Err(LocopropError::InconsistentOptimizerSlot { layer_index: index });
            };
            let Some(grad) = self.grads[index].as_ref() else {
                tracing::debug!(layer = index, "no gradient reached this layer; skipping");
                continue;
            };

            // Target: one gradient-descent step in activation-output space,
            // taken with the smoothed gradient. Constant for the local loop.
            let inp = inps[index].clone();
            let pre = layer.pre_activation(&inp)?;
            let y = layer.activation().apply(&pre).map_err(LocopropError::from)?;
            let scaled = (grad * self.config.learning_rate).map_err(LocopropError::from)?;
            let post_target = (y - scaled).map_err(LocopropError::from)?.detach();

            let opt = self.opts[index]
                .as_mut()
                .ok_or(LocopropError::InconsistentOptimizerSlot { layer_index: index })?;
            let base_lr = opt.learning_rate();
            for iteration in 0..self.config.local_iterations {
                let lr = local_learning_rate(base_lr, iteration, self.config.local_iterations);
                let local_loss = layer
                    .bregman_loss(&inp, &post_target)?
                    .mean_all()
                    .map_err(LocopropError::from)?;
                let local_grads = local_loss.backward().map_err(LocopropError::from)?;
                opt.step_with_lr(&local_grads, lr)?;
            }

            // Nudge the next layer's recorded input toward this layer's
            // post-update output, capped so downstream inputs stay close to
            // what the forward pass recorded.
            if self.config.correction > 0.0 && index + 1 < n {
                let refreshed = layer.forward(Some(&inp), None)?.detach();
                inps[index + 1] =
                    corrected_input(&inps[index + 1], &refreshed, self.config.correction)?;
            }
        }

        tracing::debug!(step = self.step, loss = f64::from(loss_value), "locoprop step complete");
        self.losses.push(loss_value);
        Ok(loss_value)
    }

    /// The wrapped model.
    pub fn model(&self) -> &Sequential {
        &self.model
    }

    /// Number of completed `step` calls.
    pub fn current_step(&self) -> u64 {
        self.step
    }

    /// Structured diagnostics collected at construction.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Which layers hold an optimizer slot, aligned by index with the
    /// model's layer list.
    pub fn optimizer_slots(&self) -> Vec<bool> {
        self.opts.iter().map(|o| o.is_some()).collect()
    }

    /// Global loss recorded at every step, for monitoring.
    pub fn losses(&self) -> &[f32] {
        &self.losses
    }

    /// The per-layer smoothed hidden-state gradients; `None` for layers
    /// without an optimizer slot (empty before the first step).
    pub fn smoothed_gradients(&self) -> &[Option<Tensor>] {
        &self.grads
    }
}

/// Per-iteration local learning rate: linear decay floored at 25% of the
/// base rate. Pure in (base rate, iteration index, iteration count).
fn local_learning_rate(base: f64, iteration: usize, local_iterations: usize) -> f64 {
    base * (1.0 - iteration as f64 / local_iterations as f64).max(0.25)
}

/// Exponentially-smoothed, bias-corrected per-layer gradient average.
///
/// First call installs the fresh gradients as-is. Afterwards each slot is
/// updated as `((1 - momentum) * g + momentum * m) / (1 - (1 - momentum)^step)`.
/// Momentum zero reduces that update to `g` exactly (the debias denominator
/// is zero there), so it short-circuits to the raw gradients.
fn smooth_gradients(
    state: &mut Vec<Option<Tensor>>,
    fresh: Vec<Option<Tensor>>,
    momentum: f64,
    step: u64,
) -> Result<()> {
    if state.is_empty() || momentum == 0.0 {
        *state = fresh;
        return Ok(());
    }
    let debias = 1.0 - (1.0 - momentum).powi(step as i32);
    let mut next = Vec::with_capacity(fresh.len());
    for (g, m) in fresh.into_iter().zip(state.iter()) {
        next.push(match (g, m) {
            (Some(g), Some(m)) => {
                let blended = ((g * (1.0 - momentum))? + (m * momentum)?)?;
                Some((blended / debias)?)
            }
            _ => None,
        });
    }
    *state = next;
    Ok(())
}

/// Move `next_input` toward `refreshed` by at most
/// `correction * sqrt(feature_dim)` along the difference direction.
fn corrected_input(next_input: &Tensor, refreshed: &Tensor, correction: f64) -> Result<Tensor> {
    let delta = (refreshed - next_input)?;
    let norm = f64::from(delta.sqr()?.sum_all()?.sqrt()?.to_scalar::<f32>()?) + 1e-5;
    let cap = correction * (delta.dim(1)? as f64).sqrt();
    let scale = norm.min(cap) / norm;
    Ok((next_input + (delta * scale)?)?)
}
