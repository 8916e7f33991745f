//! Pipeline configuration loaded from TOML.
//!
//! ```toml
//! [data]
//! start = "2023-01-02"
//! end = "2024-06-28"
//! frequency = "business_daily"
//! max_fill_gap = 3
//!
//! [[data.series]]
//! name = "usdmxn_fix"
//! source = "fx_fix"
//! path = "data/fix.csv"
//!
//! [[features]]
//! type = "sma"
//! column = "usdmxn_fix"
//! window = 5
//!
//! [window]
//! length = 30
//! horizon = 1
//! target = "usdmxn_fix"
//! inputs = ["usdmxn_fix", "usdmxn_fix_sma_5"]
//!
//! [signal]
//! threshold = 0.002
//! ```
//!
//! The window shape, the feature list, the input and target columns and the
//! signal threshold have no defaults: a config that omits them fails to parse.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use pesocast_core::data::{AlignConfig, Frequency};
use pesocast_core::domain::{ConfigHash, SourceTag};
use pesocast_core::features::{FeatureBuilder, FeatureError, FeatureSpec};
use pesocast_core::model::{ModelConfig, TargetMode};
use pesocast_core::signal::EvaluationConfig;
use pesocast_core::train::TrainConfig;
use pesocast_core::window::{SplitSpec, WindowSpec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid feature definition: {0}")]
    Feature(#[from] FeatureError),
}

/// How a series file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    /// `date|timestamp,value` rows.
    #[default]
    Numeric,
    /// `date,title,summary` headlines, scored into a sentiment series.
    News,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesConfig {
    pub name: String,
    pub source: SourceTag,
    /// Relative paths resolve against the config file's directory.
    pub path: PathBuf,
    #[serde(default)]
    pub kind: SeriesKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default = "default_frequency")]
    pub frequency: Frequency,
    #[serde(default = "default_max_fill_gap")]
    pub max_fill_gap: usize,
    pub series: Vec<SeriesConfig>,
}

fn default_frequency() -> Frequency {
    Frequency::BusinessDaily
}

fn default_max_fill_gap() -> usize {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub length: usize,
    pub horizon: usize,
    #[serde(default)]
    pub max_gap: usize,
    pub target: String,
    pub inputs: Vec<String>,
    #[serde(default)]
    pub target_mode: TargetMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub threshold: f64,
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
    /// Overrides `[model].band_sigmas` when set.
    #[serde(default)]
    pub band_sigmas: Option<f64>,
}

fn default_confidence() -> f64 {
    0.95
}

/// Everything needed to reproduce a training or inference run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub features: Vec<FeatureSpec>,
    pub window: WindowConfig,
    #[serde(default)]
    pub split: SplitSpec,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainConfig,
    pub signal: SignalConfig,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.data.end < self.data.start {
            return invalid(format!(
                "data.end {} precedes data.start {}",
                self.data.end, self.data.start
            ));
        }
        if self.data.series.is_empty() {
            return invalid("at least one [[data.series]] entry is required".into());
        }
        let mut names = HashSet::new();
        for s in &self.data.series {
            if !names.insert(s.name.as_str()) {
                return invalid(format!("duplicate series name '{}'", s.name));
            }
            if s.kind == SeriesKind::News && s.source != SourceTag::Sentiment {
                return invalid(format!(
                    "news series '{}' must use source = \"sentiment\"",
                    s.name
                ));
            }
        }
        if self.features.is_empty() {
            return invalid("at least one [[features]] entry is required".into());
        }

        self.window_spec()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.window.inputs.is_empty() {
            return invalid("window.inputs must name at least one column".into());
        }
        if self.model.target_mode != TargetMode::default()
            && self.model.target_mode != self.window.target_mode
        {
            return invalid("set target_mode under [window], not [model]".into());
        }

        // Every referenced column must be a raw series or a derived feature.
        let builder = FeatureBuilder::from_specs(&self.features)?;
        let derived = builder.output_names();
        for column in self.window.inputs.iter().chain(std::iter::once(&self.window.target)) {
            if !names.contains(column.as_str()) && !derived.contains(&column.as_str()) {
                return invalid(format!("window column '{column}' is neither a series nor a feature"));
            }
        }
        if !names.contains(self.window.target.as_str()) {
            return invalid(format!(
                "window.target '{}' must be a raw series",
                self.window.target
            ));
        }

        self.split
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.model_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.training
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.evaluation_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    /// Deterministic hash of the whole configuration.
    pub fn fingerprint(&self) -> ConfigHash {
        let json = serde_json::to_vec(self).unwrap_or_default();
        ConfigHash::from_bytes(&json)
    }

    /// Resolve a series path against the config file's directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn align_config(&self) -> AlignConfig {
        AlignConfig {
            start: self.data.start,
            end: self.data.end,
            frequency: self.data.frequency,
            max_fill_gap: self.data.max_fill_gap,
        }
    }

    /// Feature builder carrying through the raw series used as window columns.
    pub fn feature_builder(&self) -> Result<FeatureBuilder, FeatureError> {
        let raw: HashSet<&str> = self.data.series.iter().map(|s| s.name.as_str()).collect();
        let mut passthrough: Vec<&str> = Vec::new();
        for column in std::iter::once(&self.window.target).chain(&self.window.inputs) {
            if raw.contains(column.as_str()) && !passthrough.contains(&column.as_str()) {
                passthrough.push(column);
            }
        }
        Ok(FeatureBuilder::from_specs(&self.features)?.with_passthrough(passthrough))
    }

    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec {
            length: self.window.length,
            horizon: self.window.horizon,
            max_gap: self.window.max_gap,
        }
    }

    /// Model config with the window's target mode and the signal band applied.
    pub fn model_config(&self) -> ModelConfig {
        let mut model = self.model.clone();
        model.target_mode = self.window.target_mode;
        if let Some(k) = self.signal.band_sigmas {
            model.band_sigmas = Some(k);
        }
        model
    }

    pub fn evaluation_config(&self) -> EvaluationConfig {
        EvaluationConfig {
            threshold: self.signal.threshold,
            confidence_level: self.signal.confidence_level,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::MINIMAL;
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let cfg = PipelineConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(cfg.data.series.len(), 1);
        assert_eq!(cfg.data.series[0].kind, SeriesKind::Numeric);
        assert_eq!(cfg.window_spec().span(), 6);
        assert_eq!(cfg.signal.confidence_level, 0.95);
        assert_eq!(cfg.training.patience, TrainConfig::default().patience);
    }

    #[test]
    fn missing_threshold_fails_to_parse() {
        let without = MINIMAL.replace("threshold = 0.001", "");
        assert!(matches!(
            PipelineConfig::from_toml(&without),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_horizon_fails_to_parse() {
        let without = MINIMAL.replace("horizon = 1", "");
        assert!(matches!(
            PipelineConfig::from_toml(&without),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn unknown_window_column_is_rejected() {
        let bad = MINIMAL.replace(r#""fix_sma_3"]"#, r#""fix_sma_30"]"#);
        let err = PipelineConfig::from_toml(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("fix_sma_30")));
    }

    #[test]
    fn derived_target_is_rejected() {
        let bad = MINIMAL.replace(r#"target = "fix""#, r#"target = "fix_sma_3""#);
        assert!(matches!(
            PipelineConfig::from_toml(&bad),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn zero_horizon_is_rejected() {
        let bad = MINIMAL.replace("horizon = 1", "horizon = 0");
        assert!(matches!(
            PipelineConfig::from_toml(&bad),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn news_series_must_be_sentiment() {
        let bad = MINIMAL.replace(
            "path = \"fix.csv\"",
            "path = \"fix.csv\"\n\n[[data.series]]\nname = \"news\"\nsource = \"market_quote\"\npath = \"news.csv\"\nkind = \"news\"",
        );
        assert!(matches!(
            PipelineConfig::from_toml(&bad),
            Err(ConfigError::Invalid(msg)) if msg.contains("news")
        ));
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = PipelineConfig::from_toml(MINIMAL).unwrap();
        let b = PipelineConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = PipelineConfig::from_toml(&MINIMAL.replace("seed = 7", "seed = 8")).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn passthrough_covers_raw_window_columns() {
        let cfg = PipelineConfig::from_toml(MINIMAL).unwrap();
        let builder = cfg.feature_builder().unwrap();
        assert_eq!(
            builder.output_names(),
            vec!["fix_log_return", "fix_sma_3"]
        );
        assert_eq!(builder.fingerprint(), cfg.feature_builder().unwrap().fingerprint());
    }

    #[test]
    fn window_target_mode_reaches_model() {
        let cfg = PipelineConfig::from_toml(
            &MINIMAL.replace("inputs = [", "target_mode = \"delta\"\ninputs = ["),
        )
        .unwrap();
        assert_eq!(cfg.model_config().target_mode, TargetMode::Delta);
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let cfg = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(
            cfg.resolve_path(Path::new("fix.csv")),
            dir.path().join("fix.csv")
        );
    }
}
