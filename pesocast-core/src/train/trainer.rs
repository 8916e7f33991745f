//! Fits a `ModelState` on training windows with validation-based early stopping.

use chrono::NaiveDate;
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::early_stopping::EarlyStoppingConfig;
use super::learner::{run_epochs, EpochRecord, Learner};
use super::optimizer::{clip_global_norm, Adam};
use crate::domain::{ConfigHash, DatasetHash};
use crate::features::FeatureFrame;
use crate::model::{
    FeatureScaler, ModelConfig, ModelError, ModelState, Network, TargetMode, TargetScaler,
    TrainingMetadata,
};
use crate::rng::{streams, RngHierarchy};
use crate::window::{Window, WindowEngine, WindowError, WindowSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub max_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub patience: usize,
    pub min_delta: f64,
    /// Global-norm gradient clipping threshold; `None` disables clipping.
    pub clip_norm: Option<f64>,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_epochs: 100,
            batch_size: 32,
            learning_rate: 1e-3,
            patience: 10,
            min_delta: 0.0,
            clip_norm: Some(1.0),
            seed: 42,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.max_epochs == 0 || self.batch_size == 0 {
            return Err(TrainError::InvalidConfig(
                "max_epochs and batch_size must be at least 1".into(),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.patience == 0 {
            return Err(TrainError::InvalidConfig("patience must be at least 1".into()));
        }
        if !(self.min_delta.is_finite() && self.min_delta >= 0.0) {
            return Err(TrainError::InvalidConfig(format!(
                "min_delta must be finite and non-negative, got {}",
                self.min_delta
            )));
        }
        if matches!(self.clip_norm, Some(c) if !(c > 0.0)) {
            return Err(TrainError::InvalidConfig("clip_norm must be positive".into()));
        }
        Ok(())
    }

    pub fn early_stopping(&self) -> EarlyStoppingConfig {
        EarlyStoppingConfig {
            patience: self.patience,
            min_delta: self.min_delta,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TrainError {
    #[error("invalid training config: {0}")]
    InvalidConfig(String),

    #[error("no training windows")]
    EmptyTrainingSet,

    #[error("no validation windows")]
    EmptyValidationSet,

    #[error("window targeting {target_date} has no target value")]
    MissingTarget { target_date: NaiveDate },

    #[error("training diverged at epoch {epoch}")]
    Divergence {
        epoch: usize,
        /// Best state reached before divergence, if any epoch completed.
        last_stable: Option<Box<ModelState>>,
        /// Epochs completed before the non-finite loss.
        history: Vec<EpochRecord>,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Windows and schema for one training run.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub inputs: Vec<String>,
    pub target: String,
    pub window: WindowSpec,
    pub train: Vec<Window>,
    pub validation: Vec<Window>,
    pub feature_fingerprint: ConfigHash,
    pub dataset: DatasetHash,
}

impl TrainingSet {
    /// Window the train and validation partitions independently, so no window
    /// crosses the partition boundary.
    pub fn from_frames(
        train: &FeatureFrame,
        validation: &FeatureFrame,
        window: &WindowSpec,
        inputs: &[String],
        target: &str,
        feature_fingerprint: ConfigHash,
    ) -> Result<Self, WindowError> {
        let train_windows = WindowEngine::new(train, window, inputs, target)?.windows().collect();
        let validation_windows = WindowEngine::new(validation, window, inputs, target)?
            .windows()
            .collect();
        let dataset = DatasetHash::from_bytes(
            format!("{}:{}", train.dataset_hash(), validation.dataset_hash()).as_bytes(),
        );
        Ok(Self {
            inputs: inputs.to_vec(),
            target: target.to_string(),
            window: *window,
            train: train_windows,
            validation: validation_windows,
            feature_fingerprint,
            dataset,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub state: ModelState,
    pub history: Vec<EpochRecord>,
    pub stopped_early: bool,
}

/// Scaled input sequence and scaled target.
struct Sample {
    x: Array2<f64>,
    y: f64,
}

#[derive(Debug, Clone)]
pub struct Trainer {
    model: ModelConfig,
    config: TrainConfig,
}

impl Trainer {
    pub fn new(model: ModelConfig, config: TrainConfig) -> Self {
        Self { model, config }
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model
    }

    pub fn train_config(&self) -> &TrainConfig {
        &self.config
    }

    /// Train generation 1.
    pub fn fit(&self, set: &TrainingSet) -> Result<TrainOutcome, TrainError> {
        self.fit_generation(1, set)
    }

    /// Retrain from scratch on new data under the same schema; the result is
    /// the next generation of `previous`.
    pub fn refit(
        &self,
        previous: &ModelState,
        set: &TrainingSet,
    ) -> Result<TrainOutcome, TrainError> {
        previous.check_schema(&set.inputs, &set.target, &set.feature_fingerprint)?;
        self.fit_generation(previous.version().generation.saturating_add(1), set)
    }

    fn fit_generation(&self, generation: u32, set: &TrainingSet) -> Result<TrainOutcome, TrainError> {
        self.model.validate()?;
        self.config.validate()?;
        if set.train.is_empty() {
            return Err(TrainError::EmptyTrainingSet);
        }
        if set.validation.is_empty() {
            return Err(TrainError::EmptyValidationSet);
        }

        let feature_scaler = fit_feature_scaler(&set.train, set.inputs.len());
        let train_targets = raw_targets(&set.train, self.model.target_mode)?;
        let validation_targets = raw_targets(&set.validation, self.model.target_mode)?;
        let target_scaler = TargetScaler::fit(&train_targets);
        let scale = |windows: &[Window], targets: &[f64]| -> Vec<Sample> {
            windows
                .iter()
                .zip(targets)
                .map(|(w, &t)| Sample {
                    x: feature_scaler.transform(w.features.view()),
                    y: target_scaler.transform(t),
                })
                .collect()
        };
        let train = scale(&set.train, &train_targets);
        let validation = scale(&set.validation, &validation_targets);

        let rngs = RngHierarchy::new(self.config.seed);
        let network = Network::init(
            set.inputs.len(),
            &self.model,
            &mut rngs.rng_for(streams::INIT, u64::from(generation)),
        );
        tracing::info!(
            generation,
            parameters = network.parameter_count(),
            train_windows = train.len(),
            validation_windows = validation.len(),
            "training started"
        );

        let mut learner = NetworkLearner {
            adam: Adam::new(self.config.learning_rate, &network),
            net: network,
            train: &train,
            validation: &validation,
            order: (0..train.len()).collect(),
            batch_size: self.config.batch_size,
            clip_norm: self.config.clip_norm,
            dropout: self.model.dropout,
            rngs: &rngs,
        };
        let run = run_epochs(&mut learner, self.config.max_epochs, self.config.early_stopping());
        let epochs_run = run.history.len();
        let train_end = set.train.iter().map(|w| w.target_date).max();

        let assemble = |best_epoch: usize, best_loss: f64, net: Network| {
            ModelState::assemble(
                generation,
                set.inputs.clone(),
                set.target.clone(),
                set.window,
                self.model.clone(),
                feature_scaler.clone(),
                target_scaler,
                net,
                None,
                TrainingMetadata {
                    seed: self.config.seed,
                    epochs_run,
                    best_epoch,
                    best_validation_loss: best_loss,
                    train_windows: set.train.len(),
                    validation_windows: set.validation.len(),
                    train_end,
                    feature_fingerprint: set.feature_fingerprint.clone(),
                    dataset: set.dataset.clone(),
                },
            )
        };

        if let Some(epoch) = run.diverged_at {
            let last_stable = run
                .best
                .map(|(e, loss, net)| Box::new(assemble(e, loss, net)));
            return Err(TrainError::Divergence {
                epoch,
                last_stable,
                history: run.history,
            });
        }
        let (best_epoch, best_loss, best_net) = run.best.ok_or_else(|| {
            TrainError::InvalidConfig("training finished without a completed epoch".into())
        })?;

        let state = assemble(best_epoch, best_loss, best_net);
        let residual_std = validation_residual_std(&state, &set.validation)?;
        let state = state.with_residual_std(residual_std);
        tracing::info!(
            model = %state.version().short(),
            epochs_run,
            best_epoch,
            best_loss,
            stopped_early = run.stopped_early,
            "training finished"
        );
        Ok(TrainOutcome {
            state,
            history: run.history,
            stopped_early: run.stopped_early,
        })
    }
}

/// Fit input statistics on the distinct training rows (windows overlap).
fn fit_feature_scaler(windows: &[Window], width: usize) -> FeatureScaler {
    let mut rows: BTreeMap<NaiveDate, ArrayView1<'_, f64>> = BTreeMap::new();
    for w in windows {
        for (date, row) in w.dates.iter().zip(w.features.rows()) {
            rows.entry(*date).or_insert(row);
        }
    }
    let rows: Vec<_> = rows.into_values().collect();
    let matrix = Array2::from_shape_fn((rows.len(), width), |(r, c)| rows[r][c]);
    FeatureScaler::fit(matrix.view())
}

fn raw_targets(windows: &[Window], mode: TargetMode) -> Result<Vec<f64>, TrainError> {
    windows
        .iter()
        .map(|w| {
            let target = w.target.ok_or(TrainError::MissingTarget {
                target_date: w.target_date,
            })?;
            Ok(match mode {
                TargetMode::Level => target,
                TargetMode::Delta => target - w.reference,
            })
        })
        .collect()
}

/// Population std of `actual - forecast` over the validation windows.
fn validation_residual_std(state: &ModelState, windows: &[Window]) -> Result<Option<f64>, TrainError> {
    let residuals = windows
        .par_iter()
        .filter_map(|w| w.target.map(|t| (w, t)))
        .map(|(w, t)| state.predict(w).map(|p| t - p.forecast))
        .collect::<Result<Vec<_>, _>>()?;
    if residuals.is_empty() {
        return Ok(None);
    }
    let n = residuals.len() as f64;
    let mean = residuals.iter().sum::<f64>() / n;
    let var = residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    Ok(Some(var.sqrt()).filter(|s| s.is_finite()))
}

struct NetworkLearner<'a> {
    net: Network,
    adam: Adam,
    train: &'a [Sample],
    validation: &'a [Sample],
    order: Vec<usize>,
    batch_size: usize,
    clip_norm: Option<f64>,
    dropout: f64,
    rngs: &'a RngHierarchy,
}

impl NetworkLearner<'_> {
    fn dropout_mask(&self, epoch: usize, sample: usize) -> Option<Array1<f64>> {
        if self.dropout <= 0.0 {
            return None;
        }
        let keep = 1.0 / (1.0 - self.dropout);
        let mut rng = self
            .rngs
            .rng_for(streams::DROPOUT, ((epoch as u64) << 32) | sample as u64);
        Some(Array1::from_shape_fn(self.net.encoding_size(), |_| {
            if rng.gen::<f64>() < self.dropout {
                0.0
            } else {
                keep
            }
        }))
    }
}

impl Learner for NetworkLearner<'_> {
    type Snapshot = Network;

    fn train_epoch(&mut self, epoch: usize) -> f64 {
        let mut rng = self.rngs.rng_for(streams::SHUFFLE, epoch as u64);
        self.order.shuffle(&mut rng);

        let mut total = 0.0;
        let order = std::mem::take(&mut self.order);
        for batch in order.chunks(self.batch_size) {
            // per-sample gradients in parallel, summed in batch order
            let results: Vec<(f64, Network)> = batch
                .par_iter()
                .map(|&i| {
                    let sample = &self.train[i];
                    let mask = self.dropout_mask(epoch, i);
                    self.net.loss_and_grad(sample.x.view(), sample.y, mask.as_ref())
                })
                .collect();

            let mut grads = self.net.zeros_like();
            for (loss, g) in &results {
                total += loss;
                grads.accumulate(g);
            }
            grads.scale(1.0 / batch.len() as f64);
            if let Some(max_norm) = self.clip_norm {
                clip_global_norm(&mut grads, max_norm);
            }
            self.adam.step(&mut self.net, &grads);
        }
        self.order = order;
        total / self.train.len() as f64
    }

    fn validation_loss(&self) -> f64 {
        let errors: Vec<f64> = self
            .validation
            .par_iter()
            .map(|s| (self.net.predict(s.x.view()) - s.y).powi(2))
            .collect();
        errors.iter().sum::<f64>() / errors.len() as f64
    }

    fn snapshot(&self) -> Network {
        self.net.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Frequency;

    fn frame(n: usize) -> FeatureFrame {
        let d0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        FeatureFrame::new(
            Frequency::Daily,
            (0..n).map(|i| d0 + chrono::Duration::days(i as i64)).collect(),
            vec!["fix".into(), "mom".into()],
            (0..n)
                .map(|i| {
                    let x = i as f64 * 0.3;
                    vec![17.0 + x.sin() * 0.2, x.cos()]
                })
                .collect(),
        )
        .unwrap()
    }

    fn set() -> TrainingSet {
        let f = frame(60);
        TrainingSet::from_frames(
            &f.slice(0..45),
            &f.slice(45..60),
            &WindowSpec {
                length: 5,
                horizon: 1,
                max_gap: 0,
            },
            &["fix".to_string(), "mom".to_string()],
            "fix",
            ConfigHash::from_bytes(b"f"),
        )
        .unwrap()
    }

    fn trainer(epochs: usize) -> Trainer {
        Trainer::new(
            ModelConfig {
                hidden_size: 4,
                num_layers: 1,
                dense_size: Some(3),
                dropout: 0.1,
                ..ModelConfig::default()
            },
            TrainConfig {
                max_epochs: epochs,
                batch_size: 8,
                learning_rate: 0.01,
                ..TrainConfig::default()
            },
        )
    }

    #[test]
    fn same_seed_same_state() {
        let s = set();
        let a = trainer(3).fit(&s).unwrap();
        let b = trainer(3).fit(&s).unwrap();
        assert_eq!(a.state, b.state);
        assert_eq!(a.history, b.history);
    }

    #[test]
    fn different_seed_different_state() {
        let s = set();
        let a = trainer(2).fit(&s).unwrap();
        let mut t = trainer(2);
        t.config.seed = 7;
        let b = t.fit(&s).unwrap();
        assert_ne!(a.state.version().fingerprint, b.state.version().fingerprint);
    }

    #[test]
    fn training_reduces_validation_loss() {
        let s = set();
        let out = trainer(15).fit(&s).unwrap();
        let first = out.history[0].validation_loss;
        let best = out.state.metadata().best_validation_loss;
        assert!(best <= first);
        assert_eq!(out.state.version().generation, 1);
        assert!(out.state.residual_std().is_some());
    }

    #[test]
    fn refit_bumps_generation() {
        let s = set();
        let t = trainer(1);
        let first = t.fit(&s).unwrap().state;
        let second = t.refit(&first, &s).unwrap().state;
        assert_eq!(second.version().generation, 2);
    }

    #[test]
    fn refit_rejects_schema_change() {
        let s = set();
        let t = trainer(1);
        let first = t.fit(&s).unwrap().state;
        let mut changed = s.clone();
        changed.feature_fingerprint = ConfigHash::from_bytes(b"g");
        let err = t.refit(&first, &changed).unwrap_err();
        assert!(matches!(err, TrainError::Model(ModelError::SchemaMismatch { .. })));
    }

    #[test]
    fn empty_sets_are_rejected() {
        let mut s = set();
        s.validation.clear();
        assert_eq!(trainer(1).fit(&s).unwrap_err(), TrainError::EmptyValidationSet);
        s.train.clear();
        assert_eq!(trainer(1).fit(&s).unwrap_err(), TrainError::EmptyTrainingSet);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let t = Trainer::new(
            ModelConfig::default(),
            TrainConfig {
                batch_size: 0,
                ..TrainConfig::default()
            },
        );
        assert!(matches!(t.fit(&set()), Err(TrainError::InvalidConfig(_))));
    }

    #[test]
    fn non_finite_min_delta_is_rejected() {
        for min_delta in [f64::NAN, f64::INFINITY, -0.1] {
            let config = TrainConfig {
                min_delta,
                ..TrainConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(TrainError::InvalidConfig(_))),
                "min_delta {min_delta} accepted"
            );
        }
        assert!(TrainConfig {
            min_delta: 1e-4,
            ..TrainConfig::default()
        }
        .validate()
        .is_ok());
    }
}
