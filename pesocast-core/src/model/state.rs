//! Trained, immutable model state.

use chrono::NaiveDate;
use ndarray::Axis;
use serde::{Deserialize, Serialize};

use super::{FeatureScaler, ModelConfig, ModelError, Network, TargetMode, TargetScaler};
use crate::domain::{ConfigHash, DatasetHash, ModelVersion, Prediction};
use crate::window::{Window, WindowSpec};

/// How a state was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub seed: u64,
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_validation_loss: f64,
    pub train_windows: usize,
    pub validation_windows: usize,
    /// Last target date seen in training.
    pub train_end: Option<NaiveDate>,
    pub feature_fingerprint: ConfigHash,
    pub dataset: DatasetHash,
}

/// Parameters, normalisation statistics and metadata of one trained model.
///
/// There is no mutating API: retraining produces a new state with the next
/// generation number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    version: ModelVersion,
    inputs: Vec<String>,
    target: String,
    window: WindowSpec,
    config: ModelConfig,
    feature_scaler: FeatureScaler,
    target_scaler: TargetScaler,
    network: Network,
    /// Std of validation residuals in target units.
    residual_std: Option<f64>,
    metadata: TrainingMetadata,
}

/// Hashed content of a state, everything except the fingerprint itself.
#[derive(Serialize)]
struct FingerprintView<'a> {
    generation: u32,
    inputs: &'a [String],
    target: &'a str,
    window: &'a WindowSpec,
    config: &'a ModelConfig,
    feature_scaler: &'a FeatureScaler,
    target_scaler: &'a TargetScaler,
    network: &'a Network,
    residual_std: Option<f64>,
    metadata: &'a TrainingMetadata,
}

impl ModelState {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        generation: u32,
        inputs: Vec<String>,
        target: String,
        window: WindowSpec,
        config: ModelConfig,
        feature_scaler: FeatureScaler,
        target_scaler: TargetScaler,
        network: Network,
        residual_std: Option<f64>,
        metadata: TrainingMetadata,
    ) -> Self {
        let mut state = Self {
            version: ModelVersion {
                generation,
                fingerprint: String::new(),
            },
            inputs,
            target,
            window,
            config,
            feature_scaler,
            target_scaler,
            network,
            residual_std,
            metadata,
        };
        state.version.fingerprint = state.compute_fingerprint();
        state
    }

    /// BLAKE3 over the serialized content.
    pub fn compute_fingerprint(&self) -> String {
        let view = FingerprintView {
            generation: self.version.generation,
            inputs: &self.inputs,
            target: &self.target,
            window: &self.window,
            config: &self.config,
            feature_scaler: &self.feature_scaler,
            target_scaler: &self.target_scaler,
            network: &self.network,
            residual_std: self.residual_std,
            metadata: &self.metadata,
        };
        let bytes = serde_json::to_vec(&view).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    pub(crate) fn with_residual_std(&self, residual_std: Option<f64>) -> Self {
        Self::assemble(
            self.version.generation,
            self.inputs.clone(),
            self.target.clone(),
            self.window,
            self.config.clone(),
            self.feature_scaler.clone(),
            self.target_scaler,
            self.network.clone(),
            residual_std,
            self.metadata.clone(),
        )
    }

    pub fn version(&self) -> &ModelVersion {
        &self.version
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn window(&self) -> &WindowSpec {
        &self.window
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn feature_scaler(&self) -> &FeatureScaler {
        &self.feature_scaler
    }

    pub fn target_scaler(&self) -> &TargetScaler {
        &self.target_scaler
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn residual_std(&self) -> Option<f64> {
        self.residual_std
    }

    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }

    /// Reject a configuration whose inputs, target or feature definitions
    /// differ from the ones this state was trained on.
    pub fn check_schema(
        &self,
        inputs: &[String],
        target: &str,
        feature_fingerprint: &ConfigHash,
    ) -> Result<(), ModelError> {
        if inputs != self.inputs.as_slice() {
            return Err(ModelError::SchemaMismatch {
                field: "inputs",
                expected: self.inputs.join(","),
                actual: inputs.join(","),
            });
        }
        if target != self.target {
            return Err(ModelError::SchemaMismatch {
                field: "target",
                expected: self.target.clone(),
                actual: target.to_string(),
            });
        }
        if feature_fingerprint != &self.metadata.feature_fingerprint {
            return Err(ModelError::SchemaMismatch {
                field: "feature fingerprint",
                expected: self.metadata.feature_fingerprint.to_string(),
                actual: feature_fingerprint.to_string(),
            });
        }
        Ok(())
    }

    /// Raw model output for a window in target units (level or delta).
    pub(crate) fn raw_output(&self, window: &Window) -> Result<f64, ModelError> {
        if window.width() != self.feature_scaler.width() {
            return Err(ModelError::SchemaMismatch {
                field: "input width",
                expected: self.feature_scaler.width().to_string(),
                actual: window.width().to_string(),
            });
        }
        if window.features.len_of(Axis(0)) != self.window.length {
            return Err(ModelError::SchemaMismatch {
                field: "window length",
                expected: self.window.length.to_string(),
                actual: window.features.nrows().to_string(),
            });
        }
        let x = self.feature_scaler.transform(window.features.view());
        Ok(self.target_scaler.inverse(self.network.predict(x.view())))
    }

    /// Forecast the target level for one window.
    pub fn predict(&self, window: &Window) -> Result<Prediction, ModelError> {
        let out = self.raw_output(window)?;
        let forecast = match self.config.target_mode {
            TargetMode::Level => out,
            TargetMode::Delta => window.reference + out,
        };
        if !forecast.is_finite() {
            return Err(ModelError::NonFiniteOutput {
                as_of: window.as_of(),
            });
        }
        let band = self
            .residual_std
            .zip(self.config.band_sigmas)
            .map(|(s, k)| (forecast - k * s, forecast + k * s));
        Ok(Prediction {
            as_of: window.as_of(),
            target_date: window.target_date,
            reference: window.reference,
            forecast,
            band,
            model: self.version.clone(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{tiny_state, window};
    use super::*;

    #[test]
    fn predict_is_pure() {
        let state = tiny_state(TargetMode::Level);
        let w = window(2);
        let a = state.predict(&w).unwrap();
        let b = state.predict(&w).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_of, w.as_of());
        assert_eq!(a.model, *state.version());
    }

    #[test]
    fn band_uses_residual_std() {
        let state = tiny_state(TargetMode::Level);
        let p = state.predict(&window(2)).unwrap();
        let (lo, hi) = p.band.unwrap();
        assert!((hi - p.forecast - 0.2).abs() < 1e-12);
        assert!((p.forecast - lo - 0.2).abs() < 1e-12);
    }

    #[test]
    fn delta_mode_adds_reference() {
        let level = tiny_state(TargetMode::Level);
        let delta = tiny_state(TargetMode::Delta);
        let w = window(2);
        let raw = delta.raw_output(&w).unwrap();
        assert_eq!(delta.predict(&w).unwrap().forecast, w.reference + raw);
        assert_eq!(level.predict(&w).unwrap().forecast, level.raw_output(&w).unwrap());
    }

    #[test]
    fn width_mismatch_is_schema_error() {
        let state = tiny_state(TargetMode::Level);
        let err = state.predict(&window(3)).unwrap_err();
        assert!(matches!(err, ModelError::SchemaMismatch { field: "input width", .. }));
    }

    #[test]
    fn check_schema_detects_changes() {
        let state = tiny_state(TargetMode::Level);
        let fp = ConfigHash::from_bytes(b"features");
        let inputs = vec!["a".to_string(), "b".to_string()];
        assert!(state.check_schema(&inputs, "a", &fp).is_ok());
        assert!(state.check_schema(&inputs[..1], "a", &fp).is_err());
        assert!(state.check_schema(&inputs, "b", &fp).is_err());
        assert!(state
            .check_schema(&inputs, "a", &ConfigHash::from_bytes(b"other"))
            .is_err());
    }

    #[test]
    fn fingerprint_is_content_derived() {
        let a = tiny_state(TargetMode::Level);
        let b = tiny_state(TargetMode::Level);
        assert_eq!(a.version(), b.version());
        let c = a.with_residual_std(Some(0.3));
        assert_ne!(a.version().fingerprint, c.version().fingerprint);
        assert_eq!(a.compute_fingerprint(), a.version().fingerprint);
    }
}
