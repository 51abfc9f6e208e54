//! Trainer configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LocopropError, Result};
use crate::optimizer::OptimizerSpec;

/// Algorithm variant tag.
///
/// Both recognized variants share one code path; the tag is kept for
/// configuration compatibility and is stored, serialized, and logged but
/// never branched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Variant {
    /// The "S" configuration.
    LocoPropS,
    /// The "M" configuration (default).
    #[default]
    LocoPropM,
}

/// Configuration for [`crate::trainer::LocopropTrainer`].
///
/// | option | default | effect |
/// |---|---|---|
/// | `optimizer` | RMSprop(2e-5, alpha 0.9, eps 1e-6, momentum 0.999) | per-layer local update rule |
/// | `learning_rate` | 10.0 | step size applied to activation-space targets |
/// | `local_iterations` | 5 | inner optimizer steps per layer per `step` |
/// | `variant` | `LocoPropM` | bookkeeping tag, no behavioral branch |
/// | `momentum` | 0.0 | EMA smoothing for hidden-state gradients, in [0, 1) |
/// | `correction` | 0.1 | cap for inter-layer input nudging, in [0, 1]; 0 disables |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocopropConfig {
    /// Step size applied to hidden-state targets, not to parameters
    /// directly.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Number of inner optimizer steps per layer per call to `step`.
    #[serde(default = "default_local_iterations")]
    pub local_iterations: usize,

    /// Algorithm variant tag.
    #[serde(default)]
    pub variant: Variant,

    /// EMA smoothing factor for hidden-state gradients across steps,
    /// in [0, 1). Zero disables smoothing.
    #[serde(default = "default_momentum")]
    pub momentum: f64,

    /// Magnitude cap for inter-layer input nudging, in [0, 1].
    /// Zero disables correction entirely.
    #[serde(default = "default_correction")]
    pub correction: f64,

    /// Local update rule built once per trainable layer.
    ///
    /// Declared last so the TOML serialization emits the table after the
    /// scalar options.
    #[serde(default)]
    pub optimizer: OptimizerSpec,
}

fn default_learning_rate() -> f64 {
    10.0
}
fn default_local_iterations() -> usize {
    5
}
fn default_momentum() -> f64 {
    0.0
}
fn default_correction() -> f64 {
    0.1
}

impl Default for LocopropConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            local_iterations: default_local_iterations(),
            variant: Variant::default(),
            momentum: default_momentum(),
            correction: default_correction(),
            optimizer: OptimizerSpec::default(),
        }
    }
}

impl LocopropConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> LocopropConfigBuilder {
        LocopropConfigBuilder::default()
    }

    /// Check option ranges.
    ///
    /// # Errors
    ///
    /// Returns [`LocopropError::InvalidConfig`] when an option is out of its
    /// documented range.
    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() {
            return Err(LocopropError::invalid_config(format!(
                "learning_rate must be finite, got {}",
                self.learning_rate
            )));
        }
        if self.local_iterations == 0 {
            return Err(LocopropError::invalid_config(
                "local_iterations must be at least 1",
            ));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(LocopropError::invalid_config(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }
        if !(0.0..=1.0).contains(&self.correction) {
            return Err(LocopropError::invalid_config(format!(
                "correction must be in [0, 1], got {}",
                self.correction
            )));
        }
        Ok(())
    }

    /// Load a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// Save this configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

/// Builder for [`LocopropConfig`].
#[derive(Debug, Default, Clone)]
pub struct LocopropConfigBuilder {
    config: LocopropConfig,
}

impl LocopropConfigBuilder {
    /// Set the local optimizer factory.
    #[must_use]
    pub fn optimizer(mut self, optimizer: OptimizerSpec) -> Self {
        self.config.optimizer = optimizer;
        self
    }

    /// Set the activation-space target step size.
    #[must_use]
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.config.learning_rate = learning_rate;
        self
    }

    /// Set the number of inner optimizer steps per layer.
    #[must_use]
    pub fn local_iterations(mut self, local_iterations: usize) -> Self {
        self.config.local_iterations = local_iterations;
        self
    }

    /// Set the variant tag.
    #[must_use]
    pub fn variant(mut self, variant: Variant) -> Self {
        self.config.variant = variant;
        self
    }

    /// Set the gradient EMA momentum.
    #[must_use]
    pub fn momentum(mut self, momentum: f64) -> Self {
        self.config.momentum = momentum;
        self
    }

    /// Set the inter-layer correction cap.
    #[must_use]
    pub fn correction(mut self, correction: f64) -> Self {
        self.config.correction = correction;
        self
    }

    /// Build the configuration. Ranges are checked when the trainer is
    /// constructed.
    #[must_use]
    pub fn build(self) -> LocopropConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = LocopropConfig::default();
        assert!((config.learning_rate - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.local_iterations, 5);
        assert_eq!(config.variant, Variant::LocoPropM);
        assert!(config.momentum.abs() < f64::EPSILON);
        assert!((config.correction - 0.1).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = LocopropConfig::builder()
            .learning_rate(0.5)
            .local_iterations(3)
            .variant(Variant::LocoPropS)
            .momentum(0.9)
            .correction(0.0)
            .build();
        assert!((config.learning_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.local_iterations, 3);
        assert_eq!(config.variant, Variant::LocoPropS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_momentum() {
        let config = LocopropConfig::builder().momentum(1.0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_correction() {
        let config = LocopropConfig::builder().correction(1.5).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_local_iterations() {
        let config = LocopropConfig::builder().local_iterations(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: LocopropConfig = toml::from_str("").unwrap();
        assert_eq!(config.local_iterations, 5);
        assert_eq!(config.variant, Variant::LocoPropM);
    }

    #[test]
    fn test_variant_serializes_by_name() {
        let text = toml::to_string(&LocopropConfig::default()).unwrap();
        assert!(text.contains("LocoPropM"));
    }
}
