//! Model outputs and the trading signal derived from them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::ModelVersion;

/// A point forecast produced from a frozen model state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Date of the last row the model saw.
    pub as_of: NaiveDate,
    /// Date the forecast refers to (`horizon` rows after `as_of`).
    pub target_date: NaiveDate,
    /// Target column value at `as_of`.
    pub reference: f64,
    /// Forecast target level.
    pub forecast: f64,
    /// Optional `(lower, upper)` band around `forecast`.
    pub band: Option<(f64, f64)>,
    pub model: ModelVersion,
}

impl Prediction {
    /// Forecast expressed as a simple return over `reference`.
    ///
    /// Returns 0.0 when the reference is zero or non-finite.
    pub fn predicted_return(&self) -> f64 {
        if self.reference == 0.0 || !self.reference.is_finite() {
            return 0.0;
        }
        (self.forecast - self.reference) / self.reference
    }
}

/// Discretized trading decision on USD/MXN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// Position implied by the signal: +1 long USD, -1 short, 0 flat.
    pub fn position(self) -> f64 {
        match self {
            Signal::Buy => 1.0,
            Signal::Sell => -1.0,
            Signal::Hold => 0.0,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
        };
        f.write_str(s)
    }
}
