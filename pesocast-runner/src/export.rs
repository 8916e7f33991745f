//! Artifact export: CSV tables and a JSON summary.
//!
//! - `predictions.csv`: one row per forecast with its band
//! - `signals.csv`: derived signals and realized values
//! - `errors.csv`: forecast error table
//! - `epochs.csv`: per-epoch losses
//! - `features.csv`: the prepared feature frame
//! - `summary.json`: model identity and risk metrics

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use pesocast_core::domain::{ConfigHash, ModelVersion, Prediction};
use pesocast_core::features::FeatureFrame;
use pesocast_core::signal::{ForecastError, RiskMetrics, SignalRecord};
use pesocast_core::train::EpochRecord;

use crate::pipeline::TrainReport;

/// Current schema version of `summary.json`.
pub const SUMMARY_VERSION: u32 = 1;

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6}")).unwrap_or_default()
}

/// Columns: as_of, target_date, reference, forecast, lower, upper, model
pub fn export_predictions_csv(predictions: &[Prediction]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["as_of", "target_date", "reference", "forecast", "lower", "upper", "model"])?;
    for p in predictions {
        wtr.write_record([
            &p.as_of.to_string(),
            &p.target_date.to_string(),
            &format!("{:.6}", p.reference),
            &format!("{:.6}", p.forecast),
            &opt(p.band.map(|b| b.0)),
            &opt(p.band.map(|b| b.1)),
            &p.model.short(),
        ])?;
    }
    finish(wtr)
}

/// Columns: as_of, target_date, reference, forecast, predicted_return, signal, actual
pub fn export_signals_csv(records: &[SignalRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "as_of",
        "target_date",
        "reference",
        "forecast",
        "predicted_return",
        "signal",
        "actual",
    ])?;
    for r in records {
        wtr.write_record([
            &r.as_of.to_string(),
            &r.target_date.to_string(),
            &format!("{:.6}", r.reference),
            &format!("{:.6}", r.forecast),
            &format!("{:.6}", r.predicted_return),
            &r.signal.to_string(),
            &opt(r.actual),
        ])?;
    }
    finish(wtr)
}

/// Columns: date, actual, predicted, error, error_pct
pub fn export_errors_csv(errors: &[ForecastError]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "actual", "predicted", "error", "error_pct"])?;
    for e in errors {
        wtr.write_record([
            &e.date.to_string(),
            &format!("{:.6}", e.actual),
            &format!("{:.6}", e.predicted),
            &format!("{:.6}", e.error),
            &format!("{:.4}", e.error_pct),
        ])?;
    }
    finish(wtr)
}

pub fn export_epochs_csv(epochs: &[EpochRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["epoch", "train_loss", "validation_loss", "improved"])?;
    for e in epochs {
        wtr.write_record([
            &e.epoch.to_string(),
            &format!("{:.8}", e.train_loss),
            &format!("{:.8}", e.validation_loss),
            &e.improved.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Columns: date, then every frame column in order.
pub fn export_features_csv(frame: &FeatureFrame) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["date".to_string()];
    header.extend(frame.columns().iter().cloned());
    wtr.write_record(&header)?;
    for row in frame.rows() {
        let mut record = vec![row.date.to_string()];
        record.extend(row.values.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

/// Machine-readable outcome of a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub summary_version: u32,
    pub model: ModelVersion,
    pub config_fingerprint: ConfigHash,
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_validation_loss: f64,
    pub stopped_early: bool,
    pub test_metrics: Option<RiskMetrics>,
}

impl RunSummary {
    pub fn from_report(report: &TrainReport) -> Self {
        let meta = report.outcome.state.metadata();
        Self {
            summary_version: SUMMARY_VERSION,
            model: report.outcome.state.version().clone(),
            config_fingerprint: report.config_fingerprint.clone(),
            epochs_run: meta.epochs_run,
            best_epoch: meta.best_epoch,
            best_validation_loss: meta.best_validation_loss,
            stopped_early: report.outcome.stopped_early,
            test_metrics: report.test.as_ref().and_then(|t| t.report.metrics.clone()),
        }
    }
}

/// Write the artifact set of a training run into `{output_dir}/{model}/`.
///
/// Returns the created directory.
pub fn save_artifacts(report: &TrainReport, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(report.outcome.state.version().short());
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let summary = serde_json::to_string_pretty(&RunSummary::from_report(report))
        .context("failed to serialize run summary")?;
    std::fs::write(run_dir.join("summary.json"), summary)?;
    std::fs::write(run_dir.join("epochs.csv"), export_epochs_csv(&report.outcome.history)?)?;

    if let Some(test) = &report.test {
        std::fs::write(run_dir.join("predictions.csv"), export_predictions_csv(&test.predictions)?)?;
        std::fs::write(run_dir.join("signals.csv"), export_signals_csv(&test.report.records)?)?;
        std::fs::write(run_dir.join("errors.csv"), export_errors_csv(&test.errors)?)?;
    }
    tracing::info!(dir = %run_dir.display(), "artifacts saved");
    Ok(run_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pesocast_core::domain::Signal;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn prediction(band: Option<(f64, f64)>) -> Prediction {
        Prediction {
            as_of: d(3),
            target_date: d(4),
            reference: 17.2,
            forecast: 17.25,
            band,
            model: ModelVersion {
                generation: 3,
                fingerprint: "0123456789abcdef".into(),
            },
        }
    }

    #[test]
    fn predictions_csv_leaves_missing_band_empty() {
        let csv = export_predictions_csv(&[prediction(None), prediction(Some((17.0, 17.5)))]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "as_of,target_date,reference,forecast,lower,upper,model");
        assert_eq!(lines[1], "2024-01-03,2024-01-04,17.200000,17.250000,,,g3-0123456789ab");
        assert!(lines[2].contains("17.000000,17.500000"));
    }

    #[test]
    fn signals_csv_writes_signal_names() {
        let record = SignalRecord {
            as_of: d(3),
            target_date: d(4),
            reference: 17.2,
            forecast: 17.3,
            predicted_return: 0.1 / 17.2,
            signal: Signal::Buy,
            actual: None,
        };
        let csv = export_signals_csv(&[record]).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains(&Signal::Buy.to_string()));
        assert!(row.ends_with(','));
    }

    #[test]
    fn errors_csv_has_one_row_per_error() {
        let errors = vec![
            ForecastError {
                date: d(4),
                actual: 17.0,
                predicted: 17.1,
                error: 0.1,
                error_pct: 0.1 / 17.0 * 100.0,
            };
            3
        ];
        let csv = export_errors_csv(&errors).unwrap();
        assert_eq!(csv.lines().count(), 4);
    }
}
