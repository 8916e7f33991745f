//! CSV ingestion of raw series.
//!
//! Two file layouts are understood:
//! - numeric: a `date` or `timestamp` column plus a `value` column
//! - news: `date`, `title` and an optional `summary`; each headline is scored
//!   with the lexicon and becomes one `Sentiment` observation
//!
//! Empty `value` cells are simply not observations. Anything else that does
//! not parse is an error naming the series and the data row.

use chrono::{NaiveDate, NaiveDateTime};
use rayon::prelude::*;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use pesocast_core::domain::{RawSeries, SourceTag, TimeSeriesPoint};
use pesocast_core::lexicon::LexiconScorer;

use crate::config::{PipelineConfig, SeriesConfig, SeriesKind};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path} for series '{series}': {source}")]
    Open {
        series: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("series '{series}': malformed CSV: {source}")]
    Csv { series: String, source: csv::Error },

    #[error("series '{series}': missing column '{column}'")]
    MissingColumn { series: String, column: &'static str },

    #[error("series '{series}', row {row}: cannot parse date '{value}'")]
    InvalidDate {
        series: String,
        row: usize,
        value: String,
    },

    #[error("series '{series}', row {row}: cannot parse value '{value}'")]
    InvalidValue {
        series: String,
        row: usize,
        value: String,
    },

    #[error("series '{series}' has no observations")]
    Empty { series: String },
}

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a date or a timestamp. Plain dates are stamped at midnight.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d.and_time(chrono::NaiveTime::MIN));
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Read a numeric series.
pub fn read_numeric_csv<R: Read>(
    name: &str,
    source: SourceTag,
    reader: R,
) -> Result<RawSeries, LoadError> {
    let csv_err = |source| LoadError::Csv {
        series: name.to_string(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers().map_err(csv_err)?.clone();
    let position = |col: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(col));
    let time_col = position("date")
        .or_else(|| position("timestamp"))
        .ok_or_else(|| LoadError::MissingColumn {
            series: name.to_string(),
            column: "date",
        })?;
    let value_col = position("value").ok_or_else(|| LoadError::MissingColumn {
        series: name.to_string(),
        column: "value",
    })?;

    let mut points = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let row = i + 1;
        let raw_time = record.get(time_col).unwrap_or("");
        let timestamp = parse_timestamp(raw_time).ok_or_else(|| LoadError::InvalidDate {
            series: name.to_string(),
            row,
            value: raw_time.to_string(),
        })?;
        let raw_value = record.get(value_col).unwrap_or("");
        if raw_value.is_empty() {
            continue;
        }
        let value: f64 = raw_value.parse().map_err(|_| LoadError::InvalidValue {
            series: name.to_string(),
            row,
            value: raw_value.to_string(),
        })?;
        points.push(TimeSeriesPoint::new(timestamp, value, source));
    }
    finish(name, source, points)
}

#[derive(Debug, Deserialize)]
struct Headline {
    date: String,
    title: String,
    #[serde(default)]
    summary: Option<String>,
}

/// Read headlines and score each into a sentiment observation.
pub fn read_news_csv<R: Read>(
    name: &str,
    reader: R,
    scorer: &LexiconScorer,
) -> Result<RawSeries, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut points = Vec::new();
    for (i, result) in rdr.deserialize::<Headline>().enumerate() {
        let headline = result.map_err(|source| LoadError::Csv {
            series: name.to_string(),
            source,
        })?;
        let timestamp = parse_timestamp(&headline.date).ok_or_else(|| LoadError::InvalidDate {
            series: name.to_string(),
            row: i + 1,
            value: headline.date.clone(),
        })?;
        let score = scorer.score_headline(&headline.title, headline.summary.as_deref().unwrap_or(""));
        points.push(TimeSeriesPoint::new(timestamp, score, SourceTag::Sentiment));
    }
    finish(name, SourceTag::Sentiment, points)
}

fn finish(
    name: &str,
    source: SourceTag,
    points: Vec<TimeSeriesPoint>,
) -> Result<RawSeries, LoadError> {
    if points.is_empty() {
        return Err(LoadError::Empty {
            series: name.to_string(),
        });
    }
    tracing::debug!(series = name, %source, points = points.len(), "series loaded");
    Ok(RawSeries::new(name, source, points))
}

/// Load one configured series from `path`.
pub fn load_series(config: &SeriesConfig, path: &Path) -> Result<RawSeries, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        series: config.name.clone(),
        path: path.to_path_buf(),
        source,
    })?;
    match config.kind {
        SeriesKind::Numeric => read_numeric_csv(&config.name, config.source, file),
        SeriesKind::News => read_news_csv(&config.name, file, &LexiconScorer::default()),
    }
}

/// Load every configured series in parallel, preserving config order.
pub fn load_all(config: &PipelineConfig) -> Result<Vec<RawSeries>, LoadError> {
    config
        .data
        .series
        .par_iter()
        .map(|s| load_series(s, &config.resolve_path(&s.path)))
        .collect()
}
