//! PesoCast Runner: everything around the core that touches the outside world.
//!
//! - TOML pipeline configuration with a reproducible fingerprint
//! - CSV ingestion of numeric series and scored news headlines
//! - Stage-labelled pipeline orchestration (prepare, train, evaluate)
//! - Parallel inference with schema checks against stored models
//! - Model store by generation and a JSONL training history
//! - CSV and JSON artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod inference;
pub mod pipeline;
pub mod store;

pub use config::{ConfigError, PipelineConfig, SeriesConfig, SeriesKind};
pub use data_loader::{load_all, load_series, read_news_csv, read_numeric_csv, LoadError};
pub use export::{save_artifacts, RunSummary};
pub use inference::{check_compatibility, forecast, predict_windows, Forecast};
pub use pipeline::{
    evaluate_frame, prepare, prepare_batch, run_training, train, Evaluation, PipelineError,
    Prepared, Stage, StageError, TrainReport,
};
pub use store::{HistoryEntry, ModelStore, StoreError, TrainingHistory};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_is_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
    }

    #[test]
    fn pipeline_artifacts_are_send_sync() {
        assert_send::<Prepared>();
        assert_sync::<Prepared>();
        assert_send::<TrainReport>();
        assert_sync::<TrainReport>();
        assert_send::<Forecast>();
        assert_sync::<Forecast>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<PipelineError>();
        assert_sync::<PipelineError>();
        assert_send::<LoadError>();
        assert_sync::<LoadError>();
    }

    #[test]
    fn store_is_send_sync() {
        assert_send::<ModelStore>();
        assert_sync::<ModelStore>();
    }
}
