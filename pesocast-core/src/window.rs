//! Windowing engine: fixed-length input sequences paired with a target
//! `horizon` steps ahead, plus the chronological train/validation/test split.

use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::FeatureFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// Rows per input sequence.
    pub length: usize,
    /// Steps (rows) between the last input row and the target row.
    pub horizon: usize,
    /// Largest number of missing base steps tolerated between two consecutive rows.
    #[serde(default)]
    pub max_gap: usize,
}

impl WindowSpec {
    pub fn validate(&self) -> Result<(), WindowError> {
        if self.length == 0 {
            return Err(WindowError::InvalidSpec("length must be at least 1".into()));
        }
        if self.horizon == 0 {
            return Err(WindowError::InvalidSpec("horizon must be at least 1".into()));
        }
        Ok(())
    }

    /// Rows spanned by one window including its target row.
    pub fn span(&self) -> usize {
        self.length + self.horizon
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("invalid window spec: {0}")]
    InvalidSpec(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("{partition} partition is empty ({rows} rows available)")]
    EmptyPartition { partition: &'static str, rows: usize },
}

/// One input sequence and its target.
///
/// `target` is `None` only for the trailing inference window, whose target
/// date lies beyond the data.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub dates: Vec<NaiveDate>,
    /// `length × inputs` matrix, oldest row first.
    pub features: Array2<f64>,
    pub target_date: NaiveDate,
    pub target: Option<f64>,
    /// Target column value at the last input row.
    pub reference: f64,
}

impl Window {
    /// Date of the last input row.
    pub fn as_of(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    pub fn width(&self) -> usize {
        self.features.ncols()
    }
}

/// Produces windows over a borrowed feature frame.
#[derive(Debug, Clone)]
pub struct WindowEngine<'a> {
    frame: &'a FeatureFrame,
    spec: WindowSpec,
    inputs: Vec<usize>,
    target: usize,
    /// `gaps[j]` counts the breaks between rows `0..=j`; a break is a pair of
    /// consecutive rows separated by more than `max_gap` missing steps.
    gaps: Vec<usize>,
}

impl<'a> WindowEngine<'a> {
    pub fn new(
        frame: &'a FeatureFrame,
        spec: &WindowSpec,
        inputs: &[String],
        target: &str,
    ) -> Result<Self, WindowError> {
        spec.validate()?;
        if inputs.is_empty() {
            return Err(WindowError::InvalidSpec("at least one input column is required".into()));
        }
        let inputs = inputs
            .iter()
            .map(|c| {
                frame
                    .column_index(c)
                    .ok_or_else(|| WindowError::UnknownColumn(c.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let target = frame
            .column_index(target)
            .ok_or_else(|| WindowError::UnknownColumn(target.to_string()))?;

        let freq = frame.frequency();
        let dates = frame.dates();
        let mut gaps = Vec::with_capacity(dates.len());
        let mut count = 0;
        gaps.push(0);
        for pair in dates.windows(2) {
            if freq.missing_steps(pair[0], pair[1]) > spec.max_gap {
                count += 1;
            }
            gaps.push(count);
        }

        Ok(Self {
            frame,
            spec: *spec,
            inputs,
            target,
            gaps,
        })
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// Lazy iterator over all valid windows in row order.
    ///
    /// May be called repeatedly; each call starts from the first row.
    pub fn windows(&self) -> Windows<'_> {
        Windows {
            engine: self,
            next: 0,
        }
    }

    /// Upper bound on the number of windows, `rows - length - horizon + 1`.
    pub fn max_windows(&self) -> usize {
        (self.frame.len() + 1).saturating_sub(self.spec.span())
    }

    /// The window ending at the last row, with its target date projected
    /// `horizon` base steps ahead. `None` if the frame is too short or the
    /// trailing rows cross a gap.
    pub fn latest(&self) -> Option<Window> {
        let len = self.frame.len();
        if len < self.spec.length {
            return None;
        }
        let start = len - self.spec.length;
        if !self.contiguous(start, len - 1) {
            return None;
        }
        let last = self.frame.dates()[len - 1];
        let target_date = self.frame.frequency().advance(last, self.spec.horizon);
        Some(self.build(start, target_date, None))
    }

    /// No break between rows `from..=to`.
    fn contiguous(&self, from: usize, to: usize) -> bool {
        self.gaps[to] == self.gaps[from]
    }

    fn window_at(&self, start: usize) -> Option<Window> {
        let target_row = start + self.spec.length - 1 + self.spec.horizon;
        if target_row >= self.frame.len() || !self.contiguous(start, target_row) {
            return None;
        }
        Some(self.build(
            start,
            self.frame.dates()[target_row],
            Some(self.frame.value(target_row, self.target)),
        ))
    }

    fn build(&self, start: usize, target_date: NaiveDate, target: Option<f64>) -> Window {
        let end = start + self.spec.length;
        let features = Array2::from_shape_fn((self.spec.length, self.inputs.len()), |(r, c)| {
            self.frame.value(start + r, self.inputs[c])
        });
        Window {
            dates: self.frame.dates()[start..end].to_vec(),
            features,
            target_date,
            target,
            reference: self.frame.value(end - 1, self.target),
        }
    }
}

/// Iterator returned by [`WindowEngine::windows`].
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    engine: &'a WindowEngine<'a>,
    next: usize,
}

impl Iterator for Windows<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let starts = self.engine.max_windows();
        while self.next < starts {
            let start = self.next;
            self.next += 1;
            if let Some(w) = self.engine.window_at(start) {
                return Some(w);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.engine.max_windows().saturating_sub(self.next)))
    }
}

/// Fractions of rows assigned to each partition; the test partition takes
/// the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitSpec {
    pub train: f64,
    pub validation: f64,
}

impl Default for SplitSpec {
    fn default() -> Self {
        Self {
            train: 0.7,
            validation: 0.15,
        }
    }
}

impl SplitSpec {
    /// Fractions closer than this to a partition boundary are treated as equal.
    pub const TOLERANCE: f64 = 1e-9;

    /// Remaining fraction for the test partition; exactly zero when train and
    /// validation cover every row.
    pub fn test(&self) -> f64 {
        let rest = 1.0 - self.train - self.validation;
        if rest <= Self::TOLERANCE {
            0.0
        } else {
            rest
        }
    }

    pub fn validate(&self) -> Result<(), WindowError> {
        let ok = self.train > 0.0
            && self.validation >= 0.0
            && self.train + self.validation <= 1.0 + Self::TOLERANCE;
        if ok {
            Ok(())
        } else {
            Err(WindowError::InvalidSpec(format!(
                "split fractions train={} validation={} must be non-negative and sum to at most 1",
                self.train, self.validation
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitFrames {
    pub train: FeatureFrame,
    pub validation: FeatureFrame,
    pub test: FeatureFrame,
}

/// Partition rows by time. Every train row precedes every validation row,
/// which precedes every test row.
pub fn split_chronological(
    frame: &FeatureFrame,
    spec: &SplitSpec,
) -> Result<SplitFrames, WindowError> {
    spec.validate()?;
    let n = frame.len();
    let rows = |fraction: f64| {
        (((n as f64) * fraction + SplitSpec::TOLERANCE).floor() as usize).min(n)
    };
    let train_end = rows(spec.train);
    let val_end = if spec.test() == 0.0 {
        n
    } else {
        rows(spec.train + spec.validation).max(train_end)
    };

    let check = |partition: &'static str, fraction: f64, rows: usize| {
        if fraction > 0.0 && rows == 0 {
            Err(WindowError::EmptyPartition { partition, rows: n })
        } else {
            Ok(())
        }
    };
    check("train", spec.train, train_end)?;
    check("validation", spec.validation, val_end - train_end)?;
    check("test", spec.test(), n - val_end)?;

    tracing::debug!(
        train = train_end,
        validation = val_end - train_end,
        test = n - val_end,
        "chronological split"
    );
    Ok(SplitFrames {
        train: frame.slice(0..train_end),
        validation: frame.slice(train_end..val_end),
        test: frame.slice(val_end..n),
    })
}
