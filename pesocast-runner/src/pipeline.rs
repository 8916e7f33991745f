//! Pipeline orchestration: load → align → features → windowing → training →
//! inference → evaluation → persist.
//!
//! Every stage function is pure over borrowed inputs except `load` and
//! `persist`. Failures are wrapped in [`PipelineError`], which names the
//! stage so a caller can tell a data problem from a model problem.

use chrono::{NaiveDate, Utc};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use pesocast_core::data::{align_series, AlignedFrame, AlignmentError};
use pesocast_core::domain::{ConfigHash, Prediction, RawSeries};
use pesocast_core::features::{FeatureError, FeatureFrame, FeatureOutput};
use pesocast_core::model::{ModelError, ModelState, SnapshotError};
use pesocast_core::signal::{evaluate, forecast_errors, EvaluationError, EvaluationReport, ForecastError};
use pesocast_core::train::{TrainError, TrainOutcome, Trainer, TrainingSet};
use pesocast_core::window::{split_chronological, SplitFrames, WindowEngine, WindowError};

use crate::config::{ConfigError, PipelineConfig};
use crate::data_loader::{self, LoadError};
use crate::inference;
use crate::store::{HistoryEntry, ModelStore, StoreError};

/// Pipeline stage, used to label failures and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Load,
    Align,
    Features,
    Windowing,
    Training,
    Inference,
    Evaluation,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Config => "config",
            Stage::Load => "load",
            Stage::Align => "align",
            Stage::Features => "features",
            Stage::Windowing => "windowing",
            Stage::Training => "training",
            Stage::Inference => "inference",
            Stage::Evaluation => "evaluation",
            Stage::Persist => "persist",
        };
        f.write_str(s)
    }
}

/// The underlying failure of a stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

/// Attach a stage to any stage-level error.
pub trait StageResultExt<T> {
    fn stage(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T, E: Into<StageError>> StageResultExt<T> for Result<T, E> {
    fn stage(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|e| {
            let err = PipelineError {
                stage,
                source: e.into(),
            };
            tracing::error!(%stage, error = %err.source, "pipeline stage failed");
            err
        })
    }
}

/// Aligned data and derived features for one run.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub aligned: AlignedFrame,
    pub features: FeatureOutput,
    pub feature_fingerprint: ConfigHash,
}

impl Prepared {
    /// Realized target values by date, taken from the aligned frame so rows
    /// dropped by the feature builder still count as actuals.
    pub fn actuals(&self, target: &str) -> BTreeMap<NaiveDate, f64> {
        let dates = self.aligned.dates();
        self.aligned
            .column(target)
            .map(|col| {
                dates
                    .iter()
                    .zip(col)
                    .filter_map(|(d, v)| v.map(|v| (*d, v)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Load every configured series from disk.
pub fn load(config: &PipelineConfig) -> Result<Vec<RawSeries>, PipelineError> {
    tracing::info!(series = config.data.series.len(), "loading series");
    data_loader::load_all(config).stage(Stage::Load)
}

/// Align raw series and derive features.
pub fn prepare(config: &PipelineConfig, series: &[RawSeries]) -> Result<Prepared, PipelineError> {
    let aligned = align_series(series, &config.align_config()).stage(Stage::Align)?;
    tracing::info!(
        rows = aligned.len(),
        fields = aligned.fields().len(),
        "series aligned"
    );

    let builder = config.feature_builder().stage(Stage::Features)?;
    let features = builder.build(&aligned).stage(Stage::Features)?;
    tracing::info!(
        rows = features.frame.len(),
        columns = features.frame.columns().len(),
        dropped_warmup = features.report.dropped_warmup,
        dropped_missing = features.report.dropped_missing,
        "features built"
    );
    Ok(Prepared {
        aligned,
        features,
        feature_fingerprint: builder.fingerprint(),
    })
}

/// Prepare several independent series sets in parallel. Results keep input order.
pub fn prepare_batch(
    config: &PipelineConfig,
    sets: &[Vec<RawSeries>],
) -> Vec<Result<Prepared, PipelineError>> {
    sets.par_iter().map(|series| prepare(config, series)).collect()
}

/// Chronological split of the feature frame.
pub fn split(config: &PipelineConfig, prepared: &Prepared) -> Result<SplitFrames, PipelineError> {
    split_chronological(&prepared.features.frame, &config.split).stage(Stage::Windowing)
}

/// Train a model on the train/validation partitions. With `previous`, the
/// result is its next generation and the schema must match.
pub fn run_training(
    config: &PipelineConfig,
    prepared: &Prepared,
    splits: &SplitFrames,
    previous: Option<&ModelState>,
) -> Result<TrainOutcome, PipelineError> {
    let set = TrainingSet::from_frames(
        &splits.train,
        &splits.validation,
        &config.window_spec(),
        &config.window.inputs,
        &config.window.target,
        prepared.feature_fingerprint.clone(),
    )
    .stage(Stage::Windowing)?;
    tracing::info!(
        train_windows = set.train.len(),
        validation_windows = set.validation.len(),
        "windows built"
    );

    let trainer = Trainer::new(config.model_config(), config.training.clone());
    match previous {
        Some(prev) => trainer.refit(prev, &set),
        None => trainer.fit(&set),
    }
    .stage(Stage::Training)
}

/// Predictions for every complete window of `frame`, scored against actuals.
pub fn evaluate_frame(
    config: &PipelineConfig,
    state: &ModelState,
    prepared: &Prepared,
    frame: &FeatureFrame,
) -> Result<Evaluation, PipelineError> {
    let engine = WindowEngine::new(
        frame,
        &config.window_spec(),
        &config.window.inputs,
        &config.window.target,
    )
    .stage(Stage::Windowing)?;
    let windows: Vec<_> = engine.windows().collect();
    let predictions = inference::predict_windows(state, &windows).stage(Stage::Inference)?;

    let actuals = prepared.actuals(&config.window.target);
    let report = evaluate(&predictions, &actuals, &config.evaluation_config())
        .stage(Stage::Evaluation)?;
    let errors = forecast_errors(&predictions, &actuals);
    Ok(Evaluation {
        predictions,
        report,
        errors,
    })
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub predictions: Vec<Prediction>,
    pub report: EvaluationReport,
    pub errors: Vec<ForecastError>,
}

/// Everything a training run produced.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub outcome: TrainOutcome,
    pub snapshot: PathBuf,
    /// `None` when the test partition is too short for a single window.
    pub test: Option<Evaluation>,
    pub config_fingerprint: ConfigHash,
}

/// Turn a divergence with a stable earlier state into a published outcome.
///
/// The epochs completed before the failure are kept as the run's history.
/// Any other failure, or a divergence in the first epoch, is passed through.
fn recover_last_stable(err: PipelineError) -> Result<TrainOutcome, PipelineError> {
    match err {
        PipelineError {
            source:
                StageError::Train(TrainError::Divergence {
                    epoch,
                    last_stable: Some(state),
                    history,
                }),
            ..
        } => {
            tracing::warn!(
                epoch,
                model = %state.version().short(),
                completed_epochs = history.len(),
                "training diverged; publishing last stable state"
            );
            Ok(TrainOutcome {
                state: *state,
                history,
                stopped_early: true,
            })
        }
        other => Err(other),
    }
}

/// Load, prepare, train (or retrain the store's latest model), evaluate on
/// the test partition and persist the snapshot and history entry.
pub fn train(config: &PipelineConfig, store: &ModelStore) -> Result<TrainReport, PipelineError> {
    let config_fingerprint = config.fingerprint();
    tracing::info!(config = %config_fingerprint, store = %store.dir().display(), "training pipeline started");

    let series = load(config)?;
    let prepared = prepare(config, &series)?;
    let splits = split(config, &prepared)?;

    let previous = store.latest().stage(Stage::Persist)?;
    if let Some(prev) = &previous {
        tracing::info!(model = %prev.version().short(), "retraining on top of stored generation");
    }
    let outcome = run_training(config, &prepared, &splits, previous.as_ref())
        .or_else(recover_last_stable)?;

    let test = if splits.test.len() >= config.window_spec().span() {
        Some(evaluate_frame(config, &outcome.state, &prepared, &splits.test)?)
    } else {
        tracing::warn!(
            rows = splits.test.len(),
            span = config.window_spec().span(),
            "test partition too short for evaluation"
        );
        None
    };

    let snapshot = store.save(&outcome.state).stage(Stage::Persist)?;
    let meta = outcome.state.metadata();
    store
        .history()
        .append(&HistoryEntry {
            recorded_at: Utc::now(),
            model: outcome.state.version().clone(),
            config_fingerprint: config_fingerprint.clone(),
            best_epoch: meta.best_epoch,
            best_validation_loss: meta.best_validation_loss,
            stopped_early: outcome.stopped_early,
            epochs: outcome.history.clone(),
            test_metrics: test.as_ref().and_then(|t| t.report.metrics.clone()),
        })
        .stage(Stage::Persist)?;
    tracing::info!(model = %outcome.state.version().short(), path = %snapshot.display(), "training pipeline finished");

    Ok(TrainReport {
        outcome,
        snapshot,
        test,
        config_fingerprint,
    })
}
