//! Feature builder and the complete-row `FeatureFrame` it produces.

use chrono::NaiveDate;
use std::fmt;
use std::ops::Range;

use super::{Feature, FeatureError, FeatureSpec};
use crate::data::{AlignedFrame, FrameError, Frequency};
use crate::domain::{ConfigHash, DatasetHash};

/// Rows of complete, finite feature values on an ascending date axis.
///
/// Dates may skip axis steps where rows were dropped; the windowing engine
/// uses the frame's frequency to measure those gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    frequency: Frequency,
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

/// Borrowed view of one feature row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow<'a> {
    pub date: NaiveDate,
    pub values: &'a [f64],
}

impl FeatureFrame {
    pub fn new(
        frequency: Frequency,
        dates: Vec<NaiveDate>,
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, FrameError> {
        for (i, pair) in dates.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(FrameError::NonAscendingDates {
                    index: i + 1,
                    date: pair[1],
                });
            }
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(FrameError::DuplicateField(name.clone()));
            }
        }
        if rows.len() != dates.len() {
            return Err(FrameError::LengthMismatch {
                field: "rows".into(),
                expected: dates.len(),
                actual: rows.len(),
            });
        }
        for (r, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(FrameError::RowWidth {
                    row: r,
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
            if let Some(c) = row.iter().position(|v| !v.is_finite()) {
                return Err(FrameError::NonFinite {
                    row: r,
                    column: columns[c].clone(),
                });
            }
        }
        Ok(Self {
            frequency,
            dates,
            columns,
            rows,
        })
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row(&self, index: usize) -> FeatureRow<'_> {
        FeatureRow {
            date: self.dates[index],
            values: &self.rows[index],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = FeatureRow<'_>> + '_ {
        (0..self.len()).map(move |i| self.row(i))
    }

    pub fn value(&self, row: usize, column: usize) -> f64 {
        self.rows[row][column]
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<f64>> {
        let c = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[c]).collect())
    }

    /// Rows `range` as a new frame.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Self {
            frequency: self.frequency,
            dates: self.dates[start..end].to_vec(),
            columns: self.columns.clone(),
            rows: self.rows[start..end].to_vec(),
        }
    }

    /// BLAKE3 over column names, dates and values.
    pub fn dataset_hash(&self) -> DatasetHash {
        let mut hasher = blake3::Hasher::new();
        for c in &self.columns {
            hasher.update(c.as_bytes());
            hasher.update(&[0]);
        }
        for (date, row) in self.dates.iter().zip(&self.rows) {
            hasher.update(date.to_string().as_bytes());
            for v in row {
                hasher.update(&v.to_le_bytes());
            }
        }
        DatasetHash(hasher.finalize().to_hex().to_string())
    }
}

/// A feature whose lookback consumed rows at the start of the series.
///
/// Recoverable: the affected rows are dropped and the pipeline continues.
#[derive(Debug, Clone, PartialEq)]
pub struct InsufficientHistory {
    pub feature: String,
    pub lookback: usize,
    pub available: usize,
}

/// What the builder dropped and why.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BuildReport {
    pub input_rows: usize,
    pub output_rows: usize,
    /// Incomplete rows before the first complete row.
    pub dropped_warmup: usize,
    /// Incomplete rows after the first complete row (data gaps).
    pub dropped_missing: usize,
    pub insufficient_history: Vec<InsufficientHistory>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureOutput {
    pub frame: FeatureFrame,
    pub report: BuildReport,
}

/// Applies a configured list of features to an aligned frame.
pub struct FeatureBuilder {
    specs: Vec<FeatureSpec>,
    features: Vec<Box<dyn Feature>>,
    passthrough: Option<Vec<String>>,
}

impl fmt::Debug for FeatureBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureBuilder")
            .field("features", &self.output_names())
            .field("passthrough", &self.passthrough)
            .finish()
    }
}

impl FeatureBuilder {
    pub fn from_specs(specs: &[FeatureSpec]) -> Result<Self, FeatureError> {
        let mut features: Vec<Box<dyn Feature>> = Vec::with_capacity(specs.len());
        for spec in specs {
            let feature = spec.build()?;
            if features.iter().any(|f| f.name() == feature.name()) {
                return Err(FeatureError::DuplicateColumn(feature.name().to_string()));
            }
            features.push(feature);
        }
        Ok(Self {
            specs: specs.to_vec(),
            features,
            passthrough: None,
        })
    }

    /// Restrict which aligned fields are carried into the output.
    ///
    /// Without this, every aligned field is kept. Fields not carried through
    /// do not cause rows to be dropped.
    pub fn with_passthrough<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passthrough = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn specs(&self) -> &[FeatureSpec] {
        &self.specs
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name()).collect()
    }

    pub fn max_lookback(&self) -> usize {
        self.features.iter().map(|f| f.lookback()).max().unwrap_or(0)
    }

    /// Structural identity of the feature configuration.
    pub fn fingerprint(&self) -> ConfigHash {
        let json = serde_json::to_vec(&(&self.specs, &self.passthrough)).unwrap_or_default();
        ConfigHash::from_bytes(&json)
    }

    /// Derive all features and keep the complete rows.
    pub fn build(&self, frame: &AlignedFrame) -> Result<FeatureOutput, FeatureError> {
        let available = frame.len();
        let mut extended = frame.clone();
        let mut insufficient = Vec::new();

        for feature in &self.features {
            if extended.field_index(feature.name()).is_some() {
                return Err(FeatureError::DuplicateColumn(feature.name().to_string()));
            }
            let lookback = feature.lookback();
            if lookback >= available {
                return Err(FeatureError::InsufficientHistory {
                    feature: feature.name().to_string(),
                    lookback,
                    available,
                });
            }
            if lookback > 0 {
                tracing::debug!(
                    feature = feature.name(),
                    lookback,
                    available,
                    "leading rows lack history and will be dropped"
                );
                insufficient.push(InsufficientHistory {
                    feature: feature.name().to_string(),
                    lookback,
                    available,
                });
            }
            let values = feature.compute(&extended)?;
            extended = extended.with_column(feature.name(), values)?;
        }

        let mut columns: Vec<String> = match &self.passthrough {
            Some(fields) => {
                for f in fields {
                    if frame.field_index(f).is_none() {
                        return Err(FeatureError::UnknownColumn {
                            feature: "passthrough".into(),
                            column: f.clone(),
                        });
                    }
                }
                fields.clone()
            }
            None => frame.fields().to_vec(),
        };
        columns.extend(self.features.iter().map(|f| f.name().to_string()));
        let sources: Vec<&[Option<f64>]> = columns
            .iter()
            .filter_map(|c| extended.column(c))
            .collect();

        let mut dates = Vec::new();
        let mut rows = Vec::new();
        let mut dropped_warmup = 0;
        let mut dropped_missing = 0;
        for (i, date) in extended.dates().iter().enumerate() {
            let row: Option<Vec<f64>> = sources
                .iter()
                .map(|col| col[i].filter(|v| v.is_finite()))
                .collect();
            match row {
                Some(values) => {
                    dates.push(*date);
                    rows.push(values);
                }
                None if rows.is_empty() => dropped_warmup += 1,
                None => dropped_missing += 1,
            }
        }

        if rows.is_empty() {
            return Err(match insufficient.iter().max_by_key(|h| h.lookback) {
                Some(worst) => FeatureError::InsufficientHistory {
                    feature: worst.feature.clone(),
                    lookback: worst.lookback,
                    available,
                },
                None => FeatureError::NoCompleteRows,
            });
        }

        let report = BuildReport {
            input_rows: available,
            output_rows: rows.len(),
            dropped_warmup,
            dropped_missing,
            insufficient_history: insufficient,
        };
        tracing::info!(
            input_rows = report.input_rows,
            output_rows = report.output_rows,
            dropped_warmup,
            dropped_missing,
            "features built"
        );

        let frame = FeatureFrame::new(frame.frequency(), dates, columns, rows)?;
        Ok(FeatureOutput { frame, report })
    }
}
