//! Inference against a published model state.
//!
//! The state is only borrowed, so any number of threads may predict at once.

use rayon::prelude::*;

use pesocast_core::domain::{Prediction, Signal};
use pesocast_core::features::FeatureFrame;
use pesocast_core::model::{ModelError, ModelState};
use pesocast_core::signal::ThresholdPolicy;
use pesocast_core::window::{Window, WindowEngine};

use crate::config::PipelineConfig;
use crate::pipeline::{PipelineError, Prepared, Stage, StageResultExt};

/// Reject a stored model whose schema differs from the current configuration.
pub fn check_compatibility(
    state: &ModelState,
    config: &PipelineConfig,
    prepared: &Prepared,
) -> Result<(), ModelError> {
    state.check_schema(
        &config.window.inputs,
        &config.window.target,
        &prepared.feature_fingerprint,
    )?;
    let spec = config.window_spec();
    if *state.window() != spec {
        return Err(ModelError::SchemaMismatch {
            field: "window",
            expected: format!("{:?}", state.window()),
            actual: format!("{spec:?}"),
        });
    }
    if state.config().target_mode != config.window.target_mode {
        return Err(ModelError::SchemaMismatch {
            field: "target mode",
            expected: format!("{:?}", state.config().target_mode),
            actual: format!("{:?}", config.window.target_mode),
        });
    }
    Ok(())
}

/// Predict every window in parallel. Output order matches input order.
pub fn predict_windows(state: &ModelState, windows: &[Window]) -> Result<Vec<Prediction>, ModelError> {
    windows.par_iter().map(|w| state.predict(w)).collect()
}

/// The forward-looking forecast and its trading signal.
#[derive(Debug, Clone)]
pub struct Forecast {
    /// In-sample predictions for windows whose target is already known.
    pub history: Vec<Prediction>,
    /// Forecast from the most recent rows, targeting beyond the data.
    pub latest: Option<Prediction>,
    pub signal: Option<Signal>,
}

/// Predict over `frame` with a stored model after checking compatibility.
pub fn forecast(
    state: &ModelState,
    config: &PipelineConfig,
    prepared: &Prepared,
    frame: &FeatureFrame,
) -> Result<Forecast, PipelineError> {
    check_compatibility(state, config, prepared).stage(Stage::Inference)?;
    let engine = WindowEngine::new(
        frame,
        &config.window_spec(),
        &config.window.inputs,
        &config.window.target,
    )
    .stage(Stage::Windowing)?;

    let windows: Vec<Window> = engine.windows().collect();
    let history = predict_windows(state, &windows).stage(Stage::Inference)?;
    let latest = engine
        .latest()
        .map(|w| state.predict(&w))
        .transpose()
        .stage(Stage::Inference)?;

    let policy = ThresholdPolicy::new(config.signal.threshold).stage(Stage::Evaluation)?;
    let signal = latest.as_ref().map(|p| policy.signal(p));
    if let (Some(p), Some(s)) = (&latest, signal) {
        tracing::info!(
            model = %state.version().short(),
            as_of = %p.as_of,
            target_date = %p.target_date,
            forecast = p.forecast,
            signal = %s,
            "latest forecast"
        );
    } else {
        tracing::warn!("no complete trailing window; latest forecast unavailable");
    }
    Ok(Forecast {
        history,
        latest,
        signal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::MINIMAL;
    use crate::pipeline::{prepare, run_training, split, StageError};
    use chrono::NaiveDate;
    use pesocast_core::domain::{RawSeries, SourceTag};

    fn prepared(cfg: &PipelineConfig) -> Prepared {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let fx = RawSeries::from_daily(
            "fix",
            SourceTag::FxFix,
            (0..91).map(|i| {
                (
                    start + chrono::Duration::days(i),
                    17.0 + (i as f64 * 0.2).cos() * 0.1,
                )
            }),
        );
        prepare(cfg, &[fx]).unwrap()
    }

    fn trained(cfg: &PipelineConfig, p: &Prepared) -> ModelState {
        let splits = split(cfg, p).unwrap();
        run_training(cfg, p, &splits, None).unwrap().state
    }

    #[test]
    fn parallel_predictions_match_sequential() {
        let cfg = PipelineConfig::from_toml(MINIMAL).unwrap();
        let p = prepared(&cfg);
        let state = trained(&cfg, &p);
        let engine = WindowEngine::new(
            &p.features.frame,
            &cfg.window_spec(),
            &cfg.window.inputs,
            &cfg.window.target,
        )
        .unwrap();
        let windows: Vec<_> = engine.windows().collect();
        let parallel = predict_windows(&state, &windows).unwrap();
        let sequential: Vec<_> = windows.iter().map(|w| state.predict(w).unwrap()).collect();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn latest_forecast_targets_beyond_data() {
        let cfg = PipelineConfig::from_toml(MINIMAL).unwrap();
        let p = prepared(&cfg);
        let state = trained(&cfg, &p);
        let f = forecast(&state, &cfg, &p, &p.features.frame).unwrap();
        let latest = f.latest.unwrap();
        assert_eq!(latest.as_of, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert_eq!(latest.target_date, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert!(f.signal.is_some());
        assert!(latest.band.is_some());
    }

    #[test]
    fn changed_feature_list_is_a_schema_mismatch() {
        let cfg = PipelineConfig::from_toml(MINIMAL).unwrap();
        let p = prepared(&cfg);
        let state = trained(&cfg, &p);

        let changed = PipelineConfig::from_toml(
            &MINIMAL
                .replace("window = 3", "window = 4")
                .replace("fix_sma_3", "fix_sma_4"),
        )
        .unwrap();
        let p2 = prepared(&changed);
        let err = forecast(&state, &changed, &p2, &p2.features.frame).unwrap_err();
        assert_eq!(err.stage, Stage::Inference);
        assert!(matches!(
            err.source,
            StageError::Model(ModelError::SchemaMismatch { field: "inputs", .. })
        ));
    }

    #[test]
    fn changed_window_length_is_a_schema_mismatch() {
        let cfg = PipelineConfig::from_toml(MINIMAL).unwrap();
        let p = prepared(&cfg);
        let state = trained(&cfg, &p);
        let changed = PipelineConfig::from_toml(&MINIMAL.replace("length = 5", "length = 6")).unwrap();
        assert!(matches!(
            check_compatibility(&state, &changed, &p),
            Err(ModelError::SchemaMismatch { field: "window", .. })
        ));
    }
}
