//! `AlignedFrame`: named numeric fields on an ordered, unique date axis.
//!
//! Cells are `Option<f64>`. `None` is the explicit missing marker; a missing
//! value is never replaced by zero or silently dropped from a row.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base frequency of the common time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Every calendar day.
    Daily,
    /// Monday to Friday.
    BusinessDaily,
}

impl Frequency {
    pub fn includes(self, date: NaiveDate) -> bool {
        match self {
            Frequency::Daily => true,
            Frequency::BusinessDaily => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
        }
    }

    /// Every axis date in `[start, end]`.
    pub fn axis(self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut d = start;
        while d <= end {
            if self.includes(d) {
                dates.push(d);
            }
            d += Duration::days(1);
        }
        dates
    }

    /// Axis bucket an observation on `date` belongs to.
    ///
    /// Weekend observations roll forward to the next business day, so a bucket
    /// never contains information from after its own date.
    pub fn bucket(self, date: NaiveDate) -> NaiveDate {
        let mut d = date;
        while !self.includes(d) {
            d += Duration::days(1);
        }
        d
    }

    /// Number of base steps from `from` to `to` (0 when `to <= from`).
    pub fn steps_between(self, from: NaiveDate, to: NaiveDate) -> usize {
        if to <= from {
            return 0;
        }
        match self {
            Frequency::Daily => (to - from).num_days() as usize,
            Frequency::BusinessDaily => {
                let mut steps = 0;
                let mut d = from + Duration::days(1);
                while d <= to {
                    if self.includes(d) {
                        steps += 1;
                    }
                    d += Duration::days(1);
                }
                steps
            }
        }
    }

    /// The axis date `steps` base steps after `from`.
    pub fn advance(self, from: NaiveDate, steps: usize) -> NaiveDate {
        let mut d = from;
        let mut taken = 0;
        while taken < steps {
            d += Duration::days(1);
            if self.includes(d) {
                taken += 1;
            }
        }
        d
    }

    /// Base steps strictly between two consecutive row dates.
    pub fn missing_steps(self, from: NaiveDate, to: NaiveDate) -> usize {
        self.steps_between(from, to).saturating_sub(1)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("dates must be strictly ascending (violated at row {index}: {date})")]
    NonAscendingDates { index: usize, date: NaiveDate },

    #[error("duplicate field: {0}")]
    DuplicateField(String),

    #[error("field '{field}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("field count mismatch: {names} names for {columns} columns")]
    FieldCount { names: usize, columns: usize },

    #[error("row {row} has {actual} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("non-finite value at row {row}, column '{column}'")]
    NonFinite { row: usize, column: String },
}

/// Numeric fields aligned on a common date axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFrame {
    frequency: Frequency,
    dates: Vec<NaiveDate>,
    fields: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
}

impl AlignedFrame {
    /// Build a frame, validating every structural invariant.
    pub fn new(
        frequency: Frequency,
        dates: Vec<NaiveDate>,
        fields: Vec<String>,
        columns: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, FrameError> {
        for (i, pair) in dates.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(FrameError::NonAscendingDates {
                    index: i + 1,
                    date: pair[1],
                });
            }
        }
        if fields.len() != columns.len() {
            return Err(FrameError::FieldCount {
                names: fields.len(),
                columns: columns.len(),
            });
        }
        for (i, name) in fields.iter().enumerate() {
            if fields[..i].contains(name) {
                return Err(FrameError::DuplicateField(name.clone()));
            }
        }
        for (name, col) in fields.iter().zip(&columns) {
            if col.len() != dates.len() {
                return Err(FrameError::LengthMismatch {
                    field: name.clone(),
                    expected: dates.len(),
                    actual: col.len(),
                });
            }
        }
        Ok(Self {
            frequency,
            dates,
            fields,
            columns,
        })
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.field_index(name).map(|i| self.columns[i].as_slice())
    }

    pub fn value(&self, row: usize, field: &str) -> Option<f64> {
        self.column(field).and_then(|c| c.get(row).copied().flatten())
    }

    /// All fields of one row, in field order.
    pub fn row(&self, index: usize) -> Vec<Option<f64>> {
        self.columns.iter().map(|c| c[index]).collect()
    }

    /// Number of missing cells in a field.
    pub fn missing_count(&self, name: &str) -> usize {
        self.column(name)
            .map(|c| c.iter().filter(|v| v.is_none()).count())
            .unwrap_or(0)
    }

    /// A new frame with one more field. The receiver is left untouched.
    pub fn with_column(
        &self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, FrameError> {
        let mut fields = self.fields.clone();
        let mut columns = self.columns.clone();
        fields.push(name.into());
        columns.push(values);
        Self::new(self.frequency, self.dates.clone(), fields, columns)
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self {
            frequency: self.frequency,
            dates: self.dates[..n].to_vec(),
            fields: self.fields.clone(),
            columns: self.columns.iter().map(|c| c[..n].to_vec()).collect(),
        }
    }
}
