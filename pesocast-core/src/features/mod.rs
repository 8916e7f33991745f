//! Causal feature derivation.
//!
//! Every feature implements [`Feature`]: an aligned frame in, one value per row
//! out. A value at row t may only read rows `0..=t`; any missing input inside
//! the lookback makes the output missing.
//!
//! The [`FeatureBuilder`] applies features in order (later specs may reference
//! columns produced by earlier ones) and keeps only complete rows.

pub mod builder;
pub mod ema;
pub mod returns;
pub mod rolling;
pub mod rsi;
pub mod sentiment;
pub mod spec;

pub use builder::{BuildReport, FeatureBuilder, FeatureFrame, FeatureOutput, FeatureRow, InsufficientHistory};
pub use ema::{Ema, Macd};
pub use returns::{LogReturn, Momentum};
pub use rolling::{
    Bollinger, BollingerBand, RollingKurtosis, RollingSkew, RollingStd, Sma, Volatility,
};
pub use rsi::Rsi;
pub use sentiment::{SentimentAggregate, SentimentExtreme};
pub use spec::FeatureSpec;

use crate::data::{AlignedFrame, FrameError};
use thiserror::Error;

/// A derived column.
///
/// # Look-ahead contamination guard
/// No value at row t may depend on rows t+1 or later. Every feature must pass
/// the truncated-vs-full frame test.
pub trait Feature: Send + Sync {
    /// Output column name (e.g. "usdmxn_fix_sma_5").
    fn name(&self) -> &str;

    /// Rows of history needed before the first value can exist.
    fn lookback(&self) -> usize;

    /// Compute the feature for every row of `frame`.
    fn compute(&self, frame: &AlignedFrame) -> Result<Vec<Option<f64>>, FeatureError>;
}

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("feature '{feature}' references unknown column '{column}'")]
    UnknownColumn { feature: String, column: String },

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("invalid parameter for '{feature}': {reason}")]
    InvalidParameter { feature: String, reason: String },

    #[error("feature '{feature}' needs {lookback} rows of history but only {available} are available")]
    InsufficientHistory {
        feature: String,
        lookback: usize,
        available: usize,
    },

    #[error("no complete feature rows remain after dropping missing values")]
    NoCompleteRows,

    #[error("frame invariant violated: {0}")]
    Frame(#[from] FrameError),
}

/// Look up the input column of a feature.
pub(crate) fn input<'a>(
    frame: &'a AlignedFrame,
    feature: &str,
    column: &str,
) -> Result<&'a [Option<f64>], FeatureError> {
    frame.column(column).ok_or_else(|| FeatureError::UnknownColumn {
        feature: feature.to_string(),
        column: column.to_string(),
    })
}

/// Reject a constructor parameter.
pub(crate) fn require(ok: bool, feature: &str, reason: &str) -> Result<(), FeatureError> {
    if ok {
        Ok(())
    } else {
        Err(FeatureError::InvalidParameter {
            feature: feature.to_string(),
            reason: reason.to_string(),
        })
    }
}

/// Keep finite values, mark everything else missing.
pub(crate) fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Single-column frame on a daily axis starting 2024-01-01, for tests.
#[cfg(test)]
pub fn make_frame(column: &str, values: &[Option<f64>]) -> AlignedFrame {
    use crate::data::Frequency;
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let dates = (0..values.len())
        .map(|i| base + chrono::Duration::days(i as i64))
        .collect();
    AlignedFrame::new(
        Frequency::Daily,
        dates,
        vec![column.to_string()],
        vec![values.to_vec()],
    )
    .unwrap()
}

/// Same as [`make_frame`] with every value present.
#[cfg(test)]
pub fn make_dense_frame(column: &str, values: &[f64]) -> AlignedFrame {
    let v: Vec<Option<f64>> = values.iter().map(|&x| Some(x)).collect();
    make_frame(column, &v)
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
