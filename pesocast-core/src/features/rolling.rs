//! Rolling-window statistics.
//!
//! Each statistic is evaluated on the trailing window `t+1-window ..= t`.
//! A window containing any missing value yields a missing output.
//! Degenerate windows (zero variance) give 0.0 for skewness and kurtosis.

use serde::{Deserialize, Serialize};

use super::{finite, input, require, Feature, FeatureError};
use crate::data::AlignedFrame;

/// Apply `stat` to every complete trailing window of `values`.
pub(crate) fn rolling(
    values: &[Option<f64>],
    window: usize,
    stat: impl Fn(&[f64]) -> f64,
) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if window == 0 || n < window {
        return out;
    }
    let mut buf = Vec::with_capacity(window);
    for t in (window - 1)..n {
        buf.clear();
        buf.extend(values[(t + 1 - window)..=t].iter().map_while(|v| *v));
        if buf.len() == window {
            out[t] = finite(stat(&buf));
        }
    }
    out
}

pub(crate) fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub(crate) fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

fn central_moments(xs: &[f64]) -> (f64, f64, f64) {
    let n = xs.len() as f64;
    let m = mean(xs);
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for x in xs {
        let d = x - m;
        m2 += d * d;
        m3 += d * d * d;
        m4 += d * d * d * d;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// Bias-adjusted sample skewness (G1).
pub(crate) fn skewness(xs: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let (m2, m3, _) = central_moments(xs);
    if m2 <= f64::EPSILON {
        return 0.0;
    }
    let g1 = m3 / m2.powf(1.5);
    (n * (n - 1.0)).sqrt() / (n - 2.0) * g1
}

/// Bias-adjusted sample excess kurtosis (G2).
pub(crate) fn excess_kurtosis(xs: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let (m2, _, m4) = central_moments(xs);
    if m2 <= f64::EPSILON {
        return 0.0;
    }
    let g2 = m4 / (m2 * m2) - 3.0;
    ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
}

macro_rules! rolling_feature {
    ($(#[$doc:meta])* $ty:ident, $suffix:literal, $min:literal, $stat:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $ty {
            column: String,
            window: usize,
            name: String,
        }

        impl $ty {
            pub fn new(column: impl Into<String>, window: usize) -> Result<Self, FeatureError> {
                let column = column.into();
                let name = format!("{}_{}_{}", column, $suffix, window);
                require(window >= $min, &name, concat!("window must be >= ", $min))?;
                Ok(Self { column, window, name })
            }

            /// Smallest window the statistic is defined for.
            pub const MIN_WINDOW: usize = $min;
        }

        impl Feature for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn lookback(&self) -> usize {
                self.window - 1
            }

            fn compute(&self, frame: &AlignedFrame) -> Result<Vec<Option<f64>>, FeatureError> {
                let x = input(frame, &self.name, &self.column)?;
                Ok(rolling(x, self.window, $stat))
            }
        }
    };
}

rolling_feature!(
    /// Simple moving average.
    Sma, "sma", 1, mean
);
rolling_feature!(
    /// Rolling sample standard deviation.
    RollingStd, "std", 2, sample_std
);
rolling_feature!(
    /// Rolling bias-adjusted skewness.
    RollingSkew, "skew", 3, skewness
);
rolling_feature!(
    /// Rolling bias-adjusted excess kurtosis.
    RollingKurtosis, "kurt", 4, excess_kurtosis
);

/// Annualized volatility: rolling sample std of log returns × √252.
///
/// Lookback: window (window returns need window + 1 prices).
#[derive(Debug, Clone)]
pub struct Volatility {
    column: String,
    window: usize,
    name: String,
}

impl Volatility {
    pub const TRADING_DAYS: f64 = 252.0;
    pub const MIN_WINDOW: usize = 2;

    pub fn new(column: impl Into<String>, window: usize) -> Result<Self, FeatureError> {
        let column = column.into();
        let name = format!("{column}_volatility_{window}");
        require(window >= Self::MIN_WINDOW, &name, "window must be >= 2")?;
        Ok(Self {
            column,
            window,
            name,
        })
    }
}

impl Feature for Volatility {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window
    }

    fn compute(&self, frame: &AlignedFrame) -> Result<Vec<Option<f64>>, FeatureError> {
        let x = input(frame, &self.name, &self.column)?;
        let mut returns = vec![None; x.len()];
        for t in 1..x.len() {
            if let (Some(prev), Some(curr)) = (x[t - 1], x[t]) {
                if prev > 0.0 && curr > 0.0 {
                    returns[t] = finite((curr / prev).ln());
                }
            }
        }
        let scale = Self::TRADING_DAYS.sqrt();
        Ok(rolling(&returns, self.window, |w| sample_std(w) * scale))
    }
}

/// Population standard deviation (n denominator).
pub(crate) fn population_std(xs: &[f64]) -> f64 {
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

/// Which side of the Bollinger envelope a feature tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BollingerBand {
    Upper,
    Lower,
}

/// Bollinger band: SMA ± `num_std` × population std over `window` rows.
///
/// Lookback: window - 1.
#[derive(Debug, Clone)]
pub struct Bollinger {
    column: String,
    window: usize,
    num_std: f64,
    band: BollingerBand,
    name: String,
}

impl Bollinger {
    pub fn new(
        column: impl Into<String>,
        window: usize,
        num_std: f64,
        band: BollingerBand,
    ) -> Result<Self, FeatureError> {
        let column = column.into();
        let side = match band {
            BollingerBand::Upper => "upper",
            BollingerBand::Lower => "lower",
        };
        let name = format!("{column}_bb_{side}_{window}");
        require(window >= 2, &name, "window must be >= 2")?;
        require(
            num_std.is_finite() && num_std >= 0.0,
            &name,
            "num_std must be finite and non-negative",
        )?;
        Ok(Self {
            column,
            window,
            num_std,
            band,
            name,
        })
    }
}

impl Feature for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window - 1
    }

    fn compute(&self, frame: &AlignedFrame) -> Result<Vec<Option<f64>>, FeatureError> {
        let x = input(frame, &self.name, &self.column)?;
        let sign = match self.band {
            BollingerBand::Upper => 1.0,
            BollingerBand::Lower => -1.0,
        };
        Ok(rolling(x, self.window, |w| {
            mean(w) + sign * self.num_std * population_std(w)
        }))
    }
}
