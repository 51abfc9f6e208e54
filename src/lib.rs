//! # locoprop-rs
//!
//! Layer-local training for sequential candle models.
//!
//! LocoProp replaces the single end-to-end parameter update of
//! backpropagation with per-layer *target-matching* subproblems. One global
//! forward/backward pair harvests the gradient of the loss with respect to
//! every layer's pre-activation; each layer then takes a small
//! gradient-descent step in its activation-output space to form a local
//! target and runs a few ordinary first-order optimizer iterations on a
//! Bregman-divergence loss against that target. Update magnitude and
//! curvature are decoupled per layer, which is the point: global gradients
//! through deep compositions can be poorly scaled layer by layer.
//!
//! ## Quick start
//!
//! ```no_run
//! use candle_core::{Device, Tensor, Var};
//! use candle_nn::Linear;
//! use locoprop_rs::{Activation, LocoLayer, LocopropConfig, LocopropTrainer, Sequential};
//!
//! fn main() -> locoprop_rs::Result<()> {
//!     let device = Device::Cpu;
//!
//!     // Two dense layers; each LocoLayer carries the Vars backing its
//!     // parameters so the trainer can build a per-layer optimizer.
//!     let w1 = Var::randn(0f32, 0.1, (16, 8), &device)?;
//!     let l1 = Linear::new(w1.as_tensor().clone(), None);
//!     let w2 = Var::randn(0f32, 0.1, (4, 16), &device)?;
//!     let l2 = Linear::new(w2.as_tensor().clone(), None);
//!
//!     let model = Sequential::new()
//!         .add(LocoLayer::new(l1, vec![w1], Activation::Sigmoid))
//!         .add(LocoLayer::new(l2, vec![w2], Activation::Softmax));
//!
//!     let mse = |pred: &Tensor, target: &Tensor| (pred - target)?.sqr()?.mean_all();
//!     let mut trainer = LocopropTrainer::new(model, mse, LocopropConfig::default())?;
//!
//!     let x = Tensor::randn(0f32, 1.0, (32, 8), &device)?;
//!     let y = Tensor::randn(0f32, 1.0, (32, 4), &device)?;
//!     let loss = trainer.step(&x, &y)?;
//!     println!("global loss: {loss}");
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`activation`] - supported activations, their convex potentials and
//!   pseudo-inverses
//! - [`layer`] - trainable and plain layer wrappers
//! - [`model`] - the ordered sequential model
//! - [`optimizer`] - per-layer local optimizers (RMSprop, AdamW, SGD)
//! - [`config`] - trainer configuration
//! - [`trainer`] - the per-step algorithm
//! - [`error`] - error types

#![warn(missing_docs)]

pub mod activation;
pub mod config;
pub mod error;
pub mod layer;
pub mod model;
pub mod optimizer;
pub mod trainer;

pub use activation::Activation;
pub use config::{LocopropConfig, LocopropConfigBuilder, Variant};
pub use error::{LocopropError, Result};
pub use layer::{LocoLayer, PlainLayer};
pub use model::{Layer, Sequential};
pub use optimizer::{AdamWParams, LocalOptimizer, OptimizerSpec, ParamsRmsProp, RmsProp};
pub use trainer::{Diagnostic, DiagnosticKind, LocopropTrainer};
