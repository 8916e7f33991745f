//! Raw observations as delivered by the external feeds.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which upstream feed a value came from.
///
/// The tag decides how the normalizer collapses and fills the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Official daily reference rate (e.g. the Banxico FIX).
    FxFix,
    /// Equity or FX quotes, possibly intraday.
    MarketQuote,
    /// Sporadic news sentiment scores.
    Sentiment,
}

impl SourceTag {
    /// Whether gaps in this source may be forward-filled (up to the configured bound).
    pub fn forward_fillable(self) -> bool {
        matches!(self, SourceTag::FxFix | SourceTag::MarketQuote)
    }

    /// How several observations inside one base-frequency bucket collapse.
    pub fn aggregation(self) -> Aggregation {
        match self {
            SourceTag::FxFix | SourceTag::MarketQuote => Aggregation::Last,
            SourceTag::Sentiment => Aggregation::Mean,
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceTag::FxFix => "fx_fix",
            SourceTag::MarketQuote => "market_quote",
            SourceTag::Sentiment => "sentiment",
        };
        f.write_str(s)
    }
}

/// Bucket aggregation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    /// Last observation in the bucket wins (closing value).
    Last,
    /// Arithmetic mean of all observations in the bucket.
    Mean,
}

/// A single observation. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub source: SourceTag,
}

impl TimeSeriesPoint {
    pub fn new(timestamp: NaiveDateTime, value: f64, source: SourceTag) -> Self {
        Self {
            timestamp,
            value,
            source,
        }
    }

    /// Observation stamped at midnight of `date` (daily feeds).
    pub fn daily(date: NaiveDate, value: f64, source: SourceTag) -> Self {
        Self::new(date.and_time(chrono::NaiveTime::MIN), value, source)
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// A named input series from one feed. Points need not be sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    pub name: String,
    pub source: SourceTag,
    pub points: Vec<TimeSeriesPoint>,
}

impl RawSeries {
    pub fn new(name: impl Into<String>, source: SourceTag, points: Vec<TimeSeriesPoint>) -> Self {
        Self {
            name: name.into(),
            source,
            points,
        }
    }

    /// Build a daily series from `(date, value)` pairs.
    pub fn from_daily(
        name: impl Into<String>,
        source: SourceTag,
        values: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Self {
        let points = values
            .into_iter()
            .map(|(d, v)| TimeSeriesPoint::daily(d, v, source))
            .collect();
        Self::new(name, source, points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
