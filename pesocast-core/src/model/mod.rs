//! Sequence model: stacked LSTM encoder, optional ReLU dense layer and a
//! linear scalar output, with the frozen state used for inference.

pub mod dense;
pub mod lstm;
pub mod network;
pub mod scaler;
pub mod snapshot;
pub mod state;

pub use network::Network;
pub use scaler::{FeatureScaler, TargetScaler};
pub use snapshot::{SnapshotError, SNAPSHOT_FORMAT, SNAPSHOT_VERSION};
pub use state::{ModelState, TrainingMetadata};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the network regresses on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    /// The target level itself.
    #[default]
    Level,
    /// `target - reference`; the forecast is rebuilt as `reference + delta`.
    Delta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub hidden_size: usize,
    pub num_layers: usize,
    /// Width of the ReLU layer between encoder and output; `None` skips it.
    pub dense_size: Option<usize>,
    /// Inverted-dropout rate on the encoder output, training only.
    pub dropout: f64,
    pub target_mode: TargetMode,
    /// Half-width of the confidence band in validation residual stds.
    pub band_sigmas: Option<f64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_size: 50,
            num_layers: 2,
            dense_size: Some(25),
            dropout: 0.2,
            target_mode: TargetMode::Level,
            band_sigmas: Some(1.96),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.hidden_size == 0 || self.num_layers == 0 {
            return Err(ModelError::InvalidConfig(
                "hidden_size and num_layers must be at least 1".into(),
            ));
        }
        if self.dense_size == Some(0) {
            return Err(ModelError::InvalidConfig("dense_size must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if let Some(k) = self.band_sigmas {
            if !(k.is_finite() && k >= 0.0) {
                return Err(ModelError::InvalidConfig(format!(
                    "band_sigmas must be a non-negative number, got {k}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("schema mismatch on {field}: model expects {expected}, got {actual}")]
    SchemaMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("invalid model config: {0}")]
    InvalidConfig(String),

    #[error("model produced a non-finite forecast for window ending {as_of}")]
    NonFiniteOutput { as_of: chrono::NaiveDate },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ModelConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_dropout() {
        let cfg = ModelConfig {
            dropout: 1.0,
            ..ModelConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: ModelConfig = serde_json::from_str(r#"{"hidden_size": 8, "target_mode": "delta"}"#).unwrap();
        assert_eq!(cfg.hidden_size, 8);
        assert_eq!(cfg.num_layers, 2);
        assert_eq!(cfg.target_mode, TargetMode::Delta);
    }
}
