//! Criterion benchmarks for PesoCast hot paths.
//!
//! Benchmarks:
//! 1. Series alignment onto a business-day axis
//! 2. Feature building with the full indicator set
//! 3. Window generation
//! 4. One training epoch of the LSTM

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chrono::{Duration, NaiveDate};
use pesocast_core::data::{align_series, AlignConfig, AlignedFrame, Frequency};
use pesocast_core::domain::{ConfigHash, RawSeries, SourceTag};
use pesocast_core::features::{FeatureBuilder, FeatureFrame, FeatureSpec};
use pesocast_core::model::ModelConfig;
use pesocast_core::train::{TrainConfig, Trainer, TrainingSet};
use pesocast_core::window::{split_chronological, SplitSpec, WindowEngine, WindowSpec};

// ── Helpers ──────────────────────────────────────────────────────────

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 1, 1).unwrap()
}

fn make_series(n: usize) -> Vec<RawSeries> {
    let fix = (0..n).map(|i| (base() + Duration::days(i as i64), 19.0 + (i as f64 * 0.05).sin()));
    let sentiment = (0..n)
        .filter(|i| i % 3 == 0)
        .map(|i| (base() + Duration::days(i as i64), (i as f64 * 0.7).cos() * 0.5));
    vec![
        RawSeries::from_daily("usdmxn_fix", SourceTag::FxFix, fix),
        RawSeries::from_daily("news", SourceTag::Sentiment, sentiment),
    ]
}

fn align(n: usize) -> AlignedFrame {
    align_series(
        &make_series(n),
        &AlignConfig {
            start: base(),
            end: base() + Duration::days(n as i64 - 1),
            frequency: Frequency::BusinessDaily,
            max_fill_gap: 3,
        },
    )
    .unwrap()
}

fn specs() -> Vec<FeatureSpec> {
    let fix = || "usdmxn_fix".to_string();
    vec![
        FeatureSpec::LogReturn { column: fix() },
        FeatureSpec::Sma { column: fix(), window: 20 },
        FeatureSpec::Volatility { column: fix(), window: 20 },
        FeatureSpec::Momentum { column: fix(), period: 10 },
        FeatureSpec::Rsi { column: fix(), period: 14 },
        FeatureSpec::Ema { column: fix(), period: 20 },
        FeatureSpec::Macd {
            column: fix(),
            fast: 12,
            slow: 26,
            signal: 9,
        },
        FeatureSpec::RollingSkew { column: fix(), window: 20 },
        FeatureSpec::RollingKurtosis { column: fix(), window: 20 },
        FeatureSpec::SentimentAggregate {
            column: "news".into(),
            window: 7,
            min_observations: 1,
        },
    ]
}

fn build(n: usize) -> FeatureFrame {
    FeatureBuilder::from_specs(&specs())
        .unwrap()
        .with_passthrough(["usdmxn_fix"])
        .build(&align(n))
        .unwrap()
        .frame
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_alignment(c: &mut Criterion) {
    let mut group = c.benchmark_group("align_series");
    for n in [500usize, 2_000] {
        let series = make_series(n);
        let config = AlignConfig {
            start: base(),
            end: base() + Duration::days(n as i64 - 1),
            frequency: Frequency::BusinessDaily,
            max_fill_gap: 3,
        };
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| align_series(black_box(&series), black_box(&config)).unwrap());
        });
    }
    group.finish();
}

fn bench_features(c: &mut Criterion) {
    let frame = align(2_000);
    let builder = FeatureBuilder::from_specs(&specs())
        .unwrap()
        .with_passthrough(["usdmxn_fix"]);
    c.bench_function("feature_build_2000", |b| {
        b.iter(|| builder.build(black_box(&frame)).unwrap());
    });
}

fn bench_windows(c: &mut Criterion) {
    let frame = build(2_000);
    let columns = frame.columns().to_vec();
    let spec = WindowSpec {
        length: 30,
        horizon: 1,
        max_gap: 3,
    };
    c.bench_function("windows_2000", |b| {
        b.iter(|| {
            let engine = WindowEngine::new(&frame, &spec, &columns, "usdmxn_fix").unwrap();
            engine.windows().count()
        });
    });
}

fn bench_training_epoch(c: &mut Criterion) {
    let frame = build(600);
    let split = split_chronological(
        &frame,
        &SplitSpec {
            train: 0.8,
            validation: 0.2,
        },
    )
    .unwrap();
    let set = TrainingSet::from_frames(
        &split.train,
        &split.validation,
        &WindowSpec {
            length: 20,
            horizon: 1,
            max_gap: 3,
        },
        frame.columns(),
        "usdmxn_fix",
        ConfigHash::from_bytes(b"bench"),
    )
    .unwrap();
    let trainer = Trainer::new(
        ModelConfig {
            hidden_size: 16,
            ..ModelConfig::default()
        },
        TrainConfig {
            max_epochs: 1,
            ..TrainConfig::default()
        },
    );
    let mut group = c.benchmark_group("training");
    group.sample_size(10);
    group.bench_function("one_epoch", |b| {
        b.iter(|| trainer.fit(black_box(&set)).unwrap());
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_alignment,
    bench_features,
    bench_windows,
    bench_training_epoch,
);
criterion_main!(benches);
