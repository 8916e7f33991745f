//! Exponential averages: EMA and the MACD histogram.
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1).
//! Seed: the SMA of the first `period` consecutive observed values.
//! A missing value breaks the recursion; the average re-seeds once `period`
//! consecutive values have been observed again.

use super::{finite, input, require, Feature, FeatureError};
use crate::data::AlignedFrame;

/// EMA of an arbitrary column with missing values.
pub(crate) fn ema_series(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev: Option<f64> = None;
    let (mut seen, mut sum) = (0usize, 0.0);
    for (t, value) in values.iter().enumerate() {
        let Some(v) = *value else {
            prev = None;
            seen = 0;
            sum = 0.0;
            continue;
        };
        match prev {
            Some(p) => {
                let e = alpha * v + (1.0 - alpha) * p;
                out[t] = finite(e);
                prev = out[t];
            }
            None => {
                seen += 1;
                sum += v;
                if seen == period {
                    let seed = sum / period as f64;
                    out[t] = finite(seed);
                    prev = out[t];
                    seen = 0;
                    sum = 0.0;
                }
            }
        }
    }
    out
}

/// Exponential moving average. Lookback: period - 1.
#[derive(Debug, Clone)]
pub struct Ema {
    column: String,
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(column: impl Into<String>, period: usize) -> Result<Self, FeatureError> {
        let column = column.into();
        let name = format!("{column}_ema_{period}");
        require(period >= 1, &name, "period must be >= 1")?;
        Ok(Self {
            column,
            period,
            name,
        })
    }
}

impl Feature for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, frame: &AlignedFrame) -> Result<Vec<Option<f64>>, FeatureError> {
        let x = input(frame, &self.name, &self.column)?;
        Ok(ema_series(x, self.period))
    }
}

/// MACD histogram: (EMA_fast - EMA_slow) - EMA_signal(EMA_fast - EMA_slow).
///
/// Lookback: (slow - 1) + (signal - 1).
#[derive(Debug, Clone)]
pub struct Macd {
    column: String,
    fast: usize,
    slow: usize,
    signal: usize,
    name: String,
}

impl Macd {
    pub const DEFAULT_FAST: usize = 12;
    pub const DEFAULT_SLOW: usize = 26;
    pub const DEFAULT_SIGNAL: usize = 9;

    pub fn new(
        column: impl Into<String>,
        fast: usize,
        slow: usize,
        signal: usize,
    ) -> Result<Self, FeatureError> {
        let column = column.into();
        let name = format!("{column}_macd_{fast}_{slow}_{signal}");
        require(fast >= 1, &name, "fast period must be >= 1")?;
        require(slow > fast, &name, "slow period must exceed the fast period")?;
        require(signal >= 1, &name, "signal period must be >= 1")?;
        Ok(Self {
            column,
            fast,
            slow,
            signal,
            name,
        })
    }
}

impl Feature for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        (self.slow - 1) + (self.signal - 1)
    }

    fn compute(&self, frame: &AlignedFrame) -> Result<Vec<Option<f64>>, FeatureError> {
        let x = input(frame, &self.name, &self.column)?;
        let fast = ema_series(x, self.fast);
        let slow = ema_series(x, self.slow);
        let line: Vec<Option<f64>> = fast
            .iter()
            .zip(&slow)
            .map(|(f, s)| Some((*f)? - (*s)?))
            .collect();
        let signal = ema_series(&line, self.signal);
        Ok(line
            .iter()
            .zip(&signal)
            .map(|(l, s)| Some((*l)? - (*s)?))
            .collect())
    }
}
