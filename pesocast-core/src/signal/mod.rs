//! Signal and risk evaluation of forecasts.

pub mod metrics;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{Prediction, Signal};

#[derive(Debug, Error, PartialEq)]
pub enum EvaluationError {
    #[error("signal threshold must be a non-negative number, got {0}")]
    InvalidThreshold(f64),

    #[error("confidence level must be in (0, 1), got {0}")]
    InvalidConfidence(f64),
}

/// Buy when the predicted return exceeds `threshold`, sell below `-threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub threshold: f64,
}

impl ThresholdPolicy {
    pub fn new(threshold: f64) -> Result<Self, EvaluationError> {
        if !(threshold.is_finite() && threshold >= 0.0) {
            return Err(EvaluationError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    pub fn signal(&self, prediction: &Prediction) -> Signal {
        let r = prediction.predicted_return();
        if r > self.threshold {
            Signal::Buy
        } else if r < -self.threshold {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub threshold: f64,
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
}

fn default_confidence() -> f64 {
    0.95
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<ThresholdPolicy, EvaluationError> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(EvaluationError::InvalidConfidence(self.confidence_level));
        }
        ThresholdPolicy::new(self.threshold)
    }
}

/// One prediction with its derived signal and, when known, the realized value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub as_of: NaiveDate,
    pub target_date: NaiveDate,
    pub reference: f64,
    pub forecast: f64,
    pub predicted_return: f64,
    pub signal: Signal,
    pub actual: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Predictions with a realized value.
    pub count: usize,
    pub mae: f64,
    pub rmse: f64,
    /// Population std of `forecast - actual`.
    pub error_volatility: f64,
    pub confidence_level: f64,
    pub var: f64,
    pub cvar: f64,
    /// Non-Hold signals with a realized value.
    pub directional_calls: usize,
    /// Fraction of directional calls whose direction matched the realized move.
    pub hit_rate: Option<f64>,
    pub total_return: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub records: Vec<SignalRecord>,
    /// `None` when no prediction has a realized value yet.
    pub metrics: Option<RiskMetrics>,
    /// Starts at 1.0; one step per non-overlapping realized hold.
    pub equity_curve: Vec<f64>,
}

/// Per-date forecast error row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastError {
    pub date: NaiveDate,
    pub actual: f64,
    pub predicted: f64,
    pub error: f64,
    pub error_pct: f64,
}

/// Forecast errors (`predicted - actual`) for predictions with a realized value,
/// ordered by target date.
pub fn forecast_errors(
    predictions: &[Prediction],
    actuals: &BTreeMap<NaiveDate, f64>,
) -> Vec<ForecastError> {
    let mut rows: Vec<ForecastError> = predictions
        .iter()
        .filter_map(|p| {
            let actual = *actuals.get(&p.target_date)?;
            let error = p.forecast - actual;
            Some(ForecastError {
                date: p.target_date,
                actual,
                predicted: p.forecast,
                error,
                error_pct: if actual != 0.0 { error / actual * 100.0 } else { 0.0 },
            })
        })
        .collect();
    rows.sort_by_key(|r| r.date);
    rows
}

/// Derive signals and compute risk metrics against realized values.
pub fn evaluate(
    predictions: &[Prediction],
    actuals: &BTreeMap<NaiveDate, f64>,
    config: &EvaluationConfig,
) -> Result<EvaluationReport, EvaluationError> {
    let policy = config.validate()?;
    let mut ordered: Vec<&Prediction> = predictions.iter().collect();
    ordered.sort_by_key(|p| (p.as_of, p.target_date));

    let records: Vec<SignalRecord> = ordered
        .iter()
        .map(|p| SignalRecord {
            as_of: p.as_of,
            target_date: p.target_date,
            reference: p.reference,
            forecast: p.forecast,
            predicted_return: p.predicted_return(),
            signal: policy.signal(p),
            actual: actuals.get(&p.target_date).copied(),
        })
        .collect();

    let mut errors = Vec::new();
    let mut equity = vec![1.0];
    // Target date of the open hold. Overlapping predictions (horizon > 1)
    // are scored but never compound the same move twice.
    let mut held_until: Option<NaiveDate> = None;
    let mut calls = 0;
    let mut hits = 0;
    for r in &records {
        let Some(actual) = r.actual else { continue };
        errors.push(r.forecast - actual);
        let realized = if r.reference != 0.0 {
            (actual - r.reference) / r.reference
        } else {
            0.0
        };
        let position = r.signal.position();
        if position != 0.0 {
            calls += 1;
            if realized * position > 0.0 {
                hits += 1;
            }
        }
        if held_until.map_or(true, |until| r.as_of >= until) {
            let last = equity[equity.len() - 1];
            equity.push(last * (1.0 + position * realized));
            held_until = Some(r.target_date);
        }
    }

    let metrics = (!errors.is_empty()).then(|| RiskMetrics {
        count: errors.len(),
        mae: metrics::mean_absolute_error(&errors),
        rmse: metrics::root_mean_squared_error(&errors),
        error_volatility: metrics::std_dev(&errors),
        confidence_level: config.confidence_level,
        var: metrics::value_at_risk(&errors, config.confidence_level),
        cvar: metrics::conditional_value_at_risk(&errors, config.confidence_level),
        directional_calls: calls,
        hit_rate: (calls > 0).then(|| hits as f64 / calls as f64),
        total_return: metrics::total_return(&equity),
        max_drawdown: metrics::max_drawdown(&equity),
    });

    if let Some(m) = &metrics {
        tracing::info!(
            count = m.count,
            mae = m.mae,
            rmse = m.rmse,
            hit_rate = ?m.hit_rate,
            "evaluation complete"
        );
    }

    Ok(EvaluationReport {
        records,
        metrics,
        equity_curve: equity,
    })
}
