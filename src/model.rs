//! Ordered sequential model over trainable and plain layers.

use candle_core::Tensor;

use crate::error::Result;
use crate::layer::{LocoLayer, PlainLayer};

/// One slot of a [`Sequential`] model.
pub enum Layer {
    /// A trainable layer, locally optimized by the trainer.
    Loco(LocoLayer),
    /// Any other differentiable transform, no trainer involvement.
    Plain(PlainLayer),
}

impl Layer {
    /// Forward pass through this layer.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        match self {
            Self::Loco(layer) => layer.forward(Some(input), None),
            Self::Plain(layer) => layer.forward(input),
        }
    }

    /// Total number of trainable parameter elements in this layer.
    pub fn parameter_count(&self) -> usize {
        match self {
            Self::Loco(layer) => layer.parameter_count(),
            Self::Plain(layer) => layer.parameter_count(),
        }
    }

    /// The trainable layer behind this slot, if it is one.
    pub fn as_loco(&self) -> Option<&LocoLayer> {
        match self {
            Self::Loco(layer) => Some(layer),
            Self::Plain(_) => None,
        }
    }
}

impl From<LocoLayer> for Layer {
    fn from(layer: LocoLayer) -> Self {
        Self::Loco(layer)
    }
}

impl From<PlainLayer> for Layer {
    fn from(layer: PlainLayer) -> Self {
        Self::Plain(layer)
    }
}

/// An ordered sequence of layers. Order is fixed at construction and defines
/// the forward dependency chain: the output of layer `i` is the input of
/// layer `i + 1`.
#[derive(Default)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer, consuming and returning the model for chaining.
    #[must_use]
    pub fn add(mut self, layer: impl Into<Layer>) -> Self {
        self.layers.push(layer.into());
        self
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the model has no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The ordered layers.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Inference forward pass through the whole chain.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut curr = input.clone();
        for layer in &self.layers {
            curr = layer.forward(&curr)?;
        }
        Ok(curr)
    }
}
