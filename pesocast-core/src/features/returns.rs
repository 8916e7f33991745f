//! Return-style features: log returns and price-ratio momentum.

use super::{finite, input, require, Feature, FeatureError};
use crate::data::AlignedFrame;

/// ln(x_t / x_{t-1}). Lookback: 1. Non-positive prices give a missing value.
#[derive(Debug, Clone)]
pub struct LogReturn {
    column: String,
    name: String,
}

impl LogReturn {
    pub fn new(column: impl Into<String>) -> Self {
        let column = column.into();
        let name = format!("{column}_log_return");
        Self { column, name }
    }
}

impl Feature for LogReturn {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, frame: &AlignedFrame) -> Result<Vec<Option<f64>>, FeatureError> {
        let x = input(frame, &self.name, &self.column)?;
        let mut out = vec![None; x.len()];
        for t in 1..x.len() {
            if let (Some(prev), Some(curr)) = (x[t - 1], x[t]) {
                if prev > 0.0 && curr > 0.0 {
                    out[t] = finite((curr / prev).ln());
                }
            }
        }
        Ok(out)
    }
}

/// Momentum as a price ratio x_t / x_{t-period}. Lookback: period.
#[derive(Debug, Clone)]
pub struct Momentum {
    column: String,
    period: usize,
    name: String,
}

impl Momentum {
    pub fn new(column: impl Into<String>, period: usize) -> Result<Self, FeatureError> {
        let column = column.into();
        let name = format!("{column}_momentum_{period}");
        require(period >= 1, &name, "period must be >= 1")?;
        Ok(Self {
            column,
            period,
            name,
        })
    }
}

impl Feature for Momentum {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, frame: &AlignedFrame) -> Result<Vec<Option<f64>>, FeatureError> {
        let x = input(frame, &self.name, &self.column)?;
        let mut out = vec![None; x.len()];
        for t in self.period..x.len() {
            if let (Some(base), Some(curr)) = (x[t - self.period], x[t]) {
                if base != 0.0 {
                    out[t] = finite(curr / base);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{assert_approx, make_dense_frame, make_frame, DEFAULT_EPSILON};

    #[test]
    fn log_return_basic() {
        let frame = make_dense_frame("fix", &[17.0, 17.17, 17.0]);
        let r = LogReturn::new("fix").compute(&frame).unwrap();
        assert!(r[0].is_none());
        assert_approx(r[1].unwrap(), (17.17f64 / 17.0).ln(), DEFAULT_EPSILON);
        assert_approx(r[2].unwrap(), (17.0f64 / 17.17).ln(), DEFAULT_EPSILON);
    }

    #[test]
    fn log_return_missing_neighbour() {
        let frame = make_frame("fix", &[Some(17.0), None, Some(17.2), Some(17.1)]);
        let r = LogReturn::new("fix").compute(&frame).unwrap();
        assert!(r[1].is_none());
        assert!(r[2].is_none());
        assert!(r[3].is_some());
    }

    #[test]
    fn momentum_is_ratio() {
        let frame = make_dense_frame("fix", &[10.0, 11.0, 12.0, 15.0]);
        let m = Momentum::new("fix", 2).unwrap().compute(&frame).unwrap();
        assert!(m[0].is_none() && m[1].is_none());
        assert_approx(m[2].unwrap(), 1.2, DEFAULT_EPSILON);
        assert_approx(m[3].unwrap(), 15.0 / 11.0, DEFAULT_EPSILON);
    }

    #[test]
    fn unknown_column_errors() {
        let frame = make_dense_frame("fix", &[1.0]);
        let err = Momentum::new("nope", 1).unwrap().compute(&frame).unwrap_err();
        assert!(matches!(err, FeatureError::UnknownColumn { .. }));
    }

    #[test]
    fn names_carry_column_and_period() {
        let momentum = Momentum::new("fix", 5).unwrap();
        assert_eq!(momentum.name(), "fix_momentum_5");
        assert_eq!(momentum.lookback(), 5);
        assert_eq!(LogReturn::new("fix").name(), "fix_log_return");
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(matches!(
            Momentum::new("fix", 0),
            Err(FeatureError::InvalidParameter { ref feature, .. }) if feature == "fix_momentum_0"
        ));
    }
}
