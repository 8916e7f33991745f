//! Trailing sentiment aggregates.
//!
//! Sentiment arrives sporadically, so unlike the price features these
//! tolerate missing rows inside the window: they aggregate whatever scores
//! were observed and go missing only when too few were.

use super::rolling::sample_std;
use super::{finite, input, require, Feature, FeatureError};
use crate::data::AlignedFrame;

/// Shrunk trailing mean of observed scores: Σs / (n + 1).
///
/// The +1 pulls thin windows towards neutral, so a single headline weighs less
/// than a week of consistent coverage. Scores in [-1, 1] stay in (-1, 1).
/// Missing when fewer than `min_observations` scores fall in the window.
#[derive(Debug, Clone)]
pub struct SentimentAggregate {
    column: String,
    window: usize,
    min_observations: usize,
    name: String,
}

impl SentimentAggregate {
    pub fn new(
        column: impl Into<String>,
        window: usize,
        min_observations: usize,
    ) -> Result<Self, FeatureError> {
        let column = column.into();
        let name = format!("{column}_sentiment_{window}");
        require(window >= 1, &name, "window must be >= 1")?;
        require(
            (1..=window).contains(&min_observations),
            &name,
            "min_observations must be in 1..=window",
        )?;
        Ok(Self {
            column,
            window,
            min_observations,
            name,
        })
    }
}

impl Feature for SentimentAggregate {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window - 1
    }

    fn compute(&self, frame: &AlignedFrame) -> Result<Vec<Option<f64>>, FeatureError> {
        let x = input(frame, &self.name, &self.column)?;
        let mut out = vec![None; x.len()];
        for t in (self.window - 1)..x.len() {
            let observed: Vec<f64> = x[(t + 1 - self.window)..=t].iter().flatten().copied().collect();
            if observed.len() >= self.min_observations {
                let sum: f64 = observed.iter().sum();
                out[t] = finite(sum / (observed.len() as f64 + 1.0));
            }
        }
        Ok(out)
    }
}

/// Extreme-sentiment flag: 1.0 when today's score exceeds two trailing
/// standard deviations in magnitude, else 0.0.
///
/// The deviation uses observed scores of the trailing window (at least two).
/// A day without a score is not extreme.
#[derive(Debug, Clone)]
pub struct SentimentExtreme {
    column: String,
    window: usize,
    name: String,
}

impl SentimentExtreme {
    pub const SIGMAS: f64 = 2.0;

    pub fn new(column: impl Into<String>, window: usize) -> Result<Self, FeatureError> {
        let column = column.into();
        let name = format!("{column}_extreme_{window}");
        require(window >= 2, &name, "window must be >= 2")?;
        Ok(Self {
            column,
            window,
            name,
        })
    }
}

impl Feature for SentimentExtreme {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window - 1
    }

    fn compute(&self, frame: &AlignedFrame) -> Result<Vec<Option<f64>>, FeatureError> {
        let x = input(frame, &self.name, &self.column)?;
        let mut out = vec![None; x.len()];
        for t in (self.window - 1)..x.len() {
            let observed: Vec<f64> = x[(t + 1 - self.window)..=t].iter().flatten().copied().collect();
            if observed.len() < 2 {
                continue;
            }
            let sd = sample_std(&observed);
            let flag = match x[t] {
                Some(s) if sd > 0.0 && s.abs() > Self::SIGMAS * sd => 1.0,
                _ => 0.0,
            };
            out[t] = Some(flag);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{assert_approx, make_frame, DEFAULT_EPSILON};

    #[test]
    fn aggregate_skips_missing_days() {
        let frame = make_frame("sent", &[Some(0.5), None, Some(0.1), None]);
        let r = SentimentAggregate::new("sent", 3, 1).unwrap().compute(&frame).unwrap();
        assert!(r[0].is_none() && r[1].is_none());
        // window [0.5, -, 0.1] → 0.6 / 3
        assert_approx(r[2].unwrap(), 0.2, DEFAULT_EPSILON);
        // window [-, 0.1, -] → 0.1 / 2
        assert_approx(r[3].unwrap(), 0.05, DEFAULT_EPSILON);
    }

    #[test]
    fn aggregate_requires_min_observations() {
        let frame = make_frame("sent", &[Some(0.5), None, None, None]);
        let r = SentimentAggregate::new("sent", 2, 1).unwrap().compute(&frame).unwrap();
        assert!(r[1].is_some());
        assert!(r[2].is_none());
        assert!(r[3].is_none());
    }

    #[test]
    fn aggregate_stays_bounded() {
        let frame = make_frame("sent", &[Some(1.0); 5]);
        for v in SentimentAggregate::new("sent", 5, 1)
            .unwrap()
            .compute(&frame)
            .unwrap()
            .into_iter()
            .flatten()
        {
            assert!(v < 1.0 && v > -1.0);
        }
    }

    #[test]
    fn bad_parameters_are_rejected() {
        assert!(SentimentAggregate::new("sent", 3, 4).is_err());
        assert!(SentimentAggregate::new("sent", 0, 0).is_err());
        assert!(SentimentExtreme::new("sent", 1).is_err());
    }

    #[test]
    fn extreme_flags_outlier() {
        let mut values: Vec<Option<f64>> = (0..20)
            .map(|i| Some(if i % 2 == 0 { 0.01 } else { -0.01 }))
            .collect();
        values.push(Some(0.9));
        let frame = make_frame("sent", &values);
        let r = SentimentExtreme::new("sent", 20).unwrap().compute(&frame).unwrap();
        assert_eq!(r[20], Some(1.0));
        assert_eq!(r[19], Some(0.0));
    }

    #[test]
    fn extreme_without_score_is_not_extreme() {
        let frame = make_frame("sent", &[Some(0.1), Some(0.3), None]);
        let r = SentimentExtreme::new("sent", 3).unwrap().compute(&frame).unwrap();
        assert_eq!(r[2], Some(0.0));
    }
}
