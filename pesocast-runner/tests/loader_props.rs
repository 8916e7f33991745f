//! Property tests for CSV ingestion and config fingerprints.

use std::fmt::Write as _;

use chrono::{Duration, NaiveDate};
use pesocast_core::domain::SourceTag;
use pesocast_core::lexicon::LexiconScorer;
use pesocast_runner::{read_news_csv, read_numeric_csv, PipelineConfig};
use proptest::prelude::*;

const BASE_CONFIG: &str = r#"
[data]
start = "2024-01-01"
end = "2024-02-29"

[[data.series]]
name = "fix"
source = "fx_fix"
path = "fix.csv"

[[features]]
type = "rsi"
column = "fix"
period = 14

[window]
length = 10
horizon = 1
target = "fix"
inputs = ["fix", "fix_rsi_14"]

[training]
seed = SEED

[signal]
threshold = 0.001
"#;

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i as i64)
}

// ── 1. Numeric CSV keeps exactly the non-blank cells, in file order ──

proptest! {
    #[test]
    fn numeric_loader_keeps_non_blank_cells(
        cells in prop::collection::vec(prop::option::of(-1.0e6f64..1.0e6), 1..60)
    ) {
        prop_assume!(cells.iter().any(Option::is_some));
        let mut csv = String::from("date,value\n");
        for (i, cell) in cells.iter().enumerate() {
            match cell {
                Some(v) => writeln!(csv, "{},{v}", day(i)).unwrap(),
                None => writeln!(csv, "{},", day(i)).unwrap(),
            }
        }

        let series = read_numeric_csv("fix", SourceTag::FxFix, csv.as_bytes()).unwrap();
        let expected: Vec<(NaiveDate, f64)> = cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|v| (day(i), v)))
            .collect();
        let actual: Vec<(NaiveDate, f64)> = series.points.iter().map(|p| (p.date(), p.value)).collect();
        prop_assert_eq!(actual, expected);
    }
}

// ── 2. Headline scores stay inside (-1, 1) ──

proptest! {
    #[test]
    fn headline_scores_are_bounded(words in prop::collection::vec(
        prop::sample::select(vec!["sube", "cae", "riesgo", "gana", "peso", "dólar", "mejora", "débil"]),
        0..12,
    )) {
        let title = words.join(" ");
        let csv = format!("date,title\n2024-01-02,{title}\n");
        let series = read_news_csv("news", csv.as_bytes(), &LexiconScorer::default()).unwrap();
        let score = series.points[0].value;
        prop_assert!(score > -1.0 && score < 1.0, "score {} out of range", score);
    }
}

// ── 3. Fingerprint changes whenever the seed changes ──

proptest! {
    #[test]
    fn fingerprint_tracks_seed(a in 0u64..10_000, b in 0u64..10_000) {
        let ca = PipelineConfig::from_toml(&BASE_CONFIG.replace("SEED", &a.to_string())).unwrap();
        let cb = PipelineConfig::from_toml(&BASE_CONFIG.replace("SEED", &b.to_string())).unwrap();
        prop_assert_eq!(a == b, ca.fingerprint() == cb.fingerprint());
    }
}
