//! Error types for locoprop-rs.

use thiserror::Error;

/// Result type alias for locoprop-rs operations.
pub type Result<T> = std::result::Result<T, LocopropError>;

/// Errors that can occur during layer-local training.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LocopropError {
    /// A layer's `forward` was called with neither an input nor a
    /// pre-activation.
    #[error("no argument was given - provide either an input or a pre-activation")]
    MissingForwardInput,

    /// A layer holds an optimizer slot but is not a `LocoLayer`. The
    /// optimizer list was built inconsistently with the model's layer list.
    #[error("layer {layer_index} holds an optimizer slot but is not a LocoLayer")]
    InconsistentOptimizerSlot {
        /// Index of the offending layer in the model.
        layer_index: usize,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tensor operation failed.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration file.
    #[error("invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration serialization failed.
    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl LocopropError {
    /// Create an invalid config error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
