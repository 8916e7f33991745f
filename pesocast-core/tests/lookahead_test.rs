//! Look-ahead contamination tests.
//!
//! No feature value at row t may depend on data from row t+1 or later.
//!
//! Method: compute on a truncated frame (rows 0..120) and on the full frame
//! (rows 0..240). Rows 0..120 must be identical between both runs.

use chrono::{Duration, NaiveDate};
use pesocast_core::data::{align_series, AlignConfig, AlignedFrame, Frequency};
use pesocast_core::domain::{RawSeries, SourceTag};
use pesocast_core::features::{BollingerBand, Feature, FeatureBuilder, FeatureSpec};

const FULL: usize = 240;
const TRUNCATED: usize = 120;

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
}

/// Deterministic USD/MXN-like walk plus a sparse sentiment column.
fn make_frame(n: usize) -> AlignedFrame {
    let mut price = 17.5;
    let mut fix = Vec::with_capacity(n);
    let mut sentiment = Vec::with_capacity(n);
    for i in 0..n {
        let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let change = ((seed >> 33) % 200) as f64 / 100.0 - 1.0;
        price = (price + change * 0.05).max(10.0);
        fix.push(if i % 17 == 5 { None } else { Some(price) });
        sentiment.push((i % 3 != 0).then(|| change * 0.6));
    }
    let dates = (0..n).map(|i| base() + Duration::days(i as i64)).collect();
    AlignedFrame::new(
        Frequency::Daily,
        dates,
        vec!["fix".into(), "sent".into()],
        vec![fix, sentiment],
    )
    .unwrap()
}

fn all_specs() -> Vec<FeatureSpec> {
    vec![
        FeatureSpec::LogReturn { column: "fix".into() },
        FeatureSpec::Sma { column: "fix".into(), window: 5 },
        FeatureSpec::RollingStd { column: "fix".into(), window: 10 },
        FeatureSpec::Volatility { column: "fix".into(), window: 10 },
        FeatureSpec::Momentum { column: "fix".into(), period: 5 },
        FeatureSpec::Rsi { column: "fix".into(), period: 14 },
        FeatureSpec::Ema { column: "fix".into(), period: 5 },
        FeatureSpec::Bollinger {
            column: "fix".into(),
            window: 10,
            band: BollingerBand::Upper,
            num_std: 2.0,
        },
        FeatureSpec::Bollinger {
            column: "fix".into(),
            window: 10,
            band: BollingerBand::Lower,
            num_std: 2.0,
        },
        FeatureSpec::Macd {
            column: "fix".into(),
            fast: 3,
            slow: 6,
            signal: 4,
        },
        // the fix is blanked every 17 rows, so windows must fit in 16
        FeatureSpec::RollingSkew { column: "fix".into(), window: 12 },
        FeatureSpec::RollingKurtosis { column: "fix".into(), window: 12 },
        FeatureSpec::SentimentAggregate {
            column: "sent".into(),
            window: 7,
            min_observations: 2,
        },
        FeatureSpec::SentimentExtreme { column: "sent".into(), window: 10 },
    ]
}

fn assert_no_lookahead(feature: &dyn Feature, full: &AlignedFrame) {
    let truncated = full.head(TRUNCATED);
    let f = feature.compute(full).unwrap();
    let t = feature.compute(&truncated).unwrap();
    assert_eq!(t.len(), TRUNCATED, "{}: truncated length", feature.name());
    assert_eq!(f.len(), FULL, "{}: full length", feature.name());
    for i in 0..TRUNCATED {
        match (t[i], f[i]) {
            (None, None) => {}
            (Some(a), Some(b)) => assert!(
                a == b,
                "{}: look-ahead at row {i} (truncated={a}, full={b})",
                feature.name()
            ),
            (a, b) => panic!("{}: availability differs at row {i}: {a:?} vs {b:?}", feature.name()),
        }
    }
}

#[test]
fn no_feature_reads_future_rows() {
    let frame = make_frame(FULL);
    for spec in all_specs() {
        let feature = spec.build().unwrap();
        assert_no_lookahead(feature.as_ref(), &frame);
    }
}

#[test]
fn builder_rows_are_prefix_stable() {
    let full = make_frame(FULL);
    let truncated = full.head(TRUNCATED);
    let builder = FeatureBuilder::from_specs(&all_specs()).unwrap();
    let f = builder.build(&full).unwrap().frame;
    let t = builder.build(&truncated).unwrap().frame;
    assert!(!t.is_empty());
    for i in 0..t.len() {
        assert_eq!(t.row(i), f.row(i), "row {i} differs");
    }
}

#[test]
fn builder_never_zero_fills() {
    let frame = make_frame(FULL);
    let out = FeatureBuilder::from_specs(&all_specs()).unwrap().build(&frame).unwrap();
    // rows where the fix is missing must not survive
    for date in out.frame.dates() {
        let idx = frame.dates().iter().position(|d| d == date).unwrap();
        assert!(frame.value(idx, "fix").is_some());
    }
    assert!(out.report.dropped_missing > 0);
    assert!(out.report.dropped_warmup >= 19);
}

#[test]
fn alignment_is_causal() {
    let points: Vec<(NaiveDate, f64)> = (0..60)
        .filter(|i| i % 4 != 1)
        .map(|i| (base() + Duration::days(i), 17.0 + i as f64 * 0.01))
        .collect();
    let series = vec![RawSeries::from_daily("fix", SourceTag::FxFix, points)];
    let config = |end_offset: i64| AlignConfig {
        start: base(),
        end: base() + Duration::days(end_offset),
        frequency: Frequency::Daily,
        max_fill_gap: 2,
    };
    let short = align_series(&series, &config(29)).unwrap();
    let long = align_series(&series, &config(59)).unwrap();
    assert_eq!(long.head(short.len()), short);
}
