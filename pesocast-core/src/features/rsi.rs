//! Relative Strength Index (RSI), simple-average variant.
//!
//! Average gain and average loss are plain rolling means of the positive and
//! negative price changes over `period` changes.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Lookback: period.
//! Edge cases: avg_loss == 0 → 100; avg_gain == 0 → 0; no movement → 50.

use super::{input, require, Feature, FeatureError};
use crate::data::AlignedFrame;

#[derive(Debug, Clone)]
pub struct Rsi {
    column: String,
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(column: impl Into<String>, period: usize) -> Result<Self, FeatureError> {
        let column = column.into();
        let name = format!("{column}_rsi_{period}");
        require(period >= 1, &name, "period must be >= 1")?;
        Ok(Self {
            column,
            period,
            name,
        })
    }
}

impl Feature for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, frame: &AlignedFrame) -> Result<Vec<Option<f64>>, FeatureError> {
        let x = input(frame, &self.name, &self.column)?;
        let n = x.len();
        let mut out = vec![None; n];

        let changes: Vec<Option<f64>> = (0..n)
            .map(|t| {
                if t == 0 {
                    return None;
                }
                match (x[t - 1], x[t]) {
                    (Some(prev), Some(curr)) => Some(curr - prev),
                    _ => None,
                }
            })
            .collect();

        for t in self.period..n {
            let window = &changes[(t + 1 - self.period)..=t];
            let mut gain = 0.0;
            let mut loss = 0.0;
            let mut complete = true;
            for ch in window {
                match ch {
                    Some(c) if *c > 0.0 => gain += c,
                    Some(c) => loss -= c,
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                let p = self.period as f64;
                out[t] = Some(compute_rsi(gain / p, loss / p));
            }
        }
        Ok(out)
    }
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{assert_approx, make_dense_frame, make_frame};

    #[test]
    fn rsi_all_gains() {
        let frame = make_dense_frame("fix", &[17.0, 17.1, 17.2, 17.3, 17.4]);
        let r = Rsi::new("fix", 3).unwrap().compute(&frame).unwrap();
        assert!(r[2].is_none());
        assert_approx(r[3].unwrap(), 100.0, 1e-9);
    }

    #[test]
    fn rsi_all_losses() {
        let frame = make_dense_frame("fix", &[17.4, 17.3, 17.2, 17.1]);
        let r = Rsi::new("fix", 3).unwrap().compute(&frame).unwrap();
        assert_approx(r[3].unwrap(), 0.0, 1e-9);
    }

    #[test]
    fn rsi_mixed_matches_hand_computation() {
        // changes: +0.34, -0.25, -0.48 → gain 0.34, loss 0.73
        let frame = make_dense_frame("fix", &[44.0, 44.34, 44.09, 43.61]);
        let r = Rsi::new("fix", 3).unwrap().compute(&frame).unwrap();
        let expected = 100.0 - 100.0 / (1.0 + 0.34 / 0.73);
        assert_approx(r[3].unwrap(), expected, 1e-9);
    }

    #[test]
    fn rsi_flat_is_fifty() {
        let frame = make_dense_frame("fix", &[17.0, 17.0, 17.0]);
        let r = Rsi::new("fix", 2).unwrap().compute(&frame).unwrap();
        assert_approx(r[2].unwrap(), 50.0, 1e-12);
    }

    #[test]
    fn rsi_missing_change_blocks_window() {
        let frame = make_frame("fix", &[Some(1.0), Some(2.0), None, Some(3.0), Some(4.0), Some(5.0)]);
        let r = Rsi::new("fix", 2).unwrap().compute(&frame).unwrap();
        assert!(r[2].is_none() && r[3].is_none() && r[4].is_none());
        assert!(r[5].is_some());
    }

    #[test]
    fn rsi_zero_period_is_rejected() {
        assert!(Rsi::new("fix", 0).is_err());
    }

    #[test]
    fn rsi_bounds() {
        let frame = make_dense_frame("fix", &[100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0]);
        for v in Rsi::new("fix", 3).unwrap().compute(&frame).unwrap().into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v));
        }
    }
}
