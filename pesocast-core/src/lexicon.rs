//! Keyword-count sentiment scoring for Spanish market headlines.
//!
//! `score = (pos - neg) / (pos + neg + 1)`, where `pos` and `neg` count the
//! distinct lexicon terms found in the lower-cased text. Scores lie in (-1, 1).

use serde::{Deserialize, Serialize};
use std::fmt;

const POSITIVE: &[&str] = &[
    "sube",
    "aumenta",
    "crece",
    "positivo",
    "mejora",
    "gana",
    "fortalece",
    "optimista",
    "beneficio",
    "favorable",
];

const NEGATIVE: &[&str] = &[
    "baja",
    "cae",
    "disminuye",
    "negativo",
    "pierde",
    "riesgo",
    "débil",
    "preocupación",
    "deterioro",
    "adverso",
];

/// Bucket of a sentiment score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentCategory {
    Negative,
    Neutral,
    Positive,
}

impl SentimentCategory {
    pub const BOUNDARY: f64 = 0.3;

    /// `(-inf, -0.3]` negative, `(-0.3, 0.3]` neutral, `(0.3, inf)` positive.
    pub fn of(score: f64) -> Self {
        if score <= -Self::BOUNDARY {
            SentimentCategory::Negative
        } else if score <= Self::BOUNDARY {
            SentimentCategory::Neutral
        } else {
            SentimentCategory::Positive
        }
    }
}

impl fmt::Display for SentimentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SentimentCategory::Negative => "negative",
            SentimentCategory::Neutral => "neutral",
            SentimentCategory::Positive => "positive",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconScorer {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new(POSITIVE.iter().copied(), NEGATIVE.iter().copied())
    }
}

impl LexiconScorer {
    pub fn new<'a>(
        positive: impl IntoIterator<Item = &'a str>,
        negative: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            positive: positive.into_iter().map(str::to_lowercase).collect(),
            negative: negative.into_iter().map(str::to_lowercase).collect(),
        }
    }

    pub fn score(&self, text: &str) -> f64 {
        let text = text.to_lowercase();
        let count = |terms: &[String]| terms.iter().filter(|t| text.contains(t.as_str())).count();
        let pos = count(&self.positive) as f64;
        let neg = count(&self.negative) as f64;
        (pos - neg) / (pos + neg + 1.0)
    }

    /// Score a headline with its summary.
    pub fn score_headline(&self, title: &str, summary: &str) -> f64 {
        self.score(&format!("{title} {summary}"))
    }
}
