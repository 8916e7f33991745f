//! Multi-series time alignment.
//!
//! Given raw series from several feeds, align them onto one base-frequency
//! axis. Forward-fillable sources (FX fix, quotes) carry their last value for
//! at most `max_fill_gap` steps; everything else that is not observed stays
//! `None`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use super::frame::{AlignedFrame, FrameError, Frequency};
use crate::domain::{Aggregation, RawSeries};

/// Requested axis for alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub frequency: Frequency,
    /// Maximum consecutive base steps a forward-fillable series may be carried.
    pub max_fill_gap: usize,
}

#[derive(Debug, Error, PartialEq)]
pub enum AlignmentError {
    #[error("no input series")]
    NoSeries,

    #[error("invalid date range {start} .. {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("duplicate series name: {0}")]
    DuplicateSeries(String),

    #[error("series '{series}' has no observations between {start} and {end}")]
    NoOverlap {
        series: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("frame invariant violated: {0}")]
    Frame(#[from] FrameError),
}

/// Align raw series onto the axis described by `config`.
///
/// Fields appear in input order. Non-finite raw values are treated as not
/// observed. Observations before `start` only seed the forward fill.
pub fn align_series(
    series: &[RawSeries],
    config: &AlignConfig,
) -> Result<AlignedFrame, AlignmentError> {
    if series.is_empty() {
        return Err(AlignmentError::NoSeries);
    }
    let dates = config.frequency.axis(config.start, config.end);
    let (first, last) = match (dates.first(), dates.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => {
            return Err(AlignmentError::InvalidRange {
                start: config.start,
                end: config.end,
            })
        }
    };

    let mut seen = HashSet::new();
    for s in series {
        if !seen.insert(s.name.as_str()) {
            return Err(AlignmentError::DuplicateSeries(s.name.clone()));
        }
    }

    let mut fields = Vec::with_capacity(series.len());
    let mut columns = Vec::with_capacity(series.len());
    for s in series {
        let column = align_one(s, &dates, first, last, config)?;
        tracing::debug!(
            series = %s.name,
            source = %s.source,
            rows = dates.len(),
            missing = column.iter().filter(|v| v.is_none()).count(),
            "aligned series"
        );
        fields.push(s.name.clone());
        columns.push(column);
    }

    Ok(AlignedFrame::new(config.frequency, dates, fields, columns)?)
}

#[derive(Default)]
struct Bucket {
    sum: f64,
    count: usize,
    last: f64,
}

fn align_one(
    series: &RawSeries,
    dates: &[NaiveDate],
    first: NaiveDate,
    last: NaiveDate,
    config: &AlignConfig,
) -> Result<Vec<Option<f64>>, AlignmentError> {
    let freq = config.frequency;

    // Stable sort keeps feed order for equal timestamps.
    let mut points: Vec<_> = series
        .points
        .iter()
        .filter(|p| p.value.is_finite())
        .collect();
    points.sort_by_key(|p| p.timestamp);

    let mut buckets: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();
    let mut seed: Option<(NaiveDate, f64)> = None;
    for p in points {
        let bucket = freq.bucket(p.date());
        if bucket < first {
            seed = Some((bucket, p.value));
            continue;
        }
        if bucket > last {
            continue;
        }
        let b = buckets.entry(bucket).or_default();
        b.sum += p.value;
        b.count += 1;
        b.last = p.value;
    }

    if buckets.is_empty() {
        return Err(AlignmentError::NoOverlap {
            series: series.name.clone(),
            start: config.start,
            end: config.end,
        });
    }

    let fillable = series.source.forward_fillable();
    let aggregation = series.source.aggregation();

    let mut carried: Option<f64> = None;
    let mut gap = 0usize;
    if let Some((seed_date, value)) = seed {
        carried = Some(value);
        gap = freq.steps_between(seed_date, first).saturating_sub(1);
    }

    let mut column = Vec::with_capacity(dates.len());
    for date in dates {
        match buckets.get(date) {
            Some(b) => {
                let v = match aggregation {
                    Aggregation::Last => b.last,
                    Aggregation::Mean => b.sum / b.count as f64,
                };
                carried = Some(v);
                gap = 0;
                column.push(Some(v));
            }
            None => {
                gap += 1;
                let filled = match carried {
                    Some(v) if fillable && gap <= config.max_fill_gap => Some(v),
                    _ => None,
                };
                column.push(filled);
            }
        }
    }
    Ok(column)
}
