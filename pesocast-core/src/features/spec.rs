//! Serializable feature configuration.

use serde::{Deserialize, Serialize};

use super::{
    Bollinger, BollingerBand, Ema, Feature, FeatureError, LogReturn, Macd, Momentum,
    RollingKurtosis, RollingSkew, RollingStd, Rsi, SentimentAggregate, SentimentExtreme, Sma,
    Volatility,
};

fn default_num_std() -> f64 {
    2.0
}

fn default_fast() -> usize {
    Macd::DEFAULT_FAST
}

fn default_slow() -> usize {
    Macd::DEFAULT_SLOW
}

fn default_signal() -> usize {
    Macd::DEFAULT_SIGNAL
}

/// One derived column, as written in the pipeline config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureSpec {
    LogReturn { column: String },
    Sma { column: String, window: usize },
    Ema { column: String, period: usize },
    RollingStd { column: String, window: usize },
    Volatility { column: String, window: usize },
    Momentum { column: String, period: usize },
    Rsi { column: String, period: usize },
    Bollinger {
        column: String,
        window: usize,
        band: BollingerBand,
        #[serde(default = "default_num_std")]
        num_std: f64,
    },
    Macd {
        column: String,
        #[serde(default = "default_fast")]
        fast: usize,
        #[serde(default = "default_slow")]
        slow: usize,
        #[serde(default = "default_signal")]
        signal: usize,
    },
    RollingSkew { column: String, window: usize },
    RollingKurtosis { column: String, window: usize },
    SentimentAggregate {
        column: String,
        window: usize,
        min_observations: usize,
    },
    SentimentExtreme { column: String, window: usize },
}

impl FeatureSpec {
    /// Validate parameters and instantiate the feature.
    pub fn build(&self) -> Result<Box<dyn Feature>, FeatureError> {
        let feature: Box<dyn Feature> = match self {
            FeatureSpec::LogReturn { column } => Box::new(LogReturn::new(column.as_str())),
            FeatureSpec::Sma { column, window } => Box::new(Sma::new(column.as_str(), *window)?),
            FeatureSpec::Ema { column, period } => Box::new(Ema::new(column.as_str(), *period)?),
            FeatureSpec::RollingStd { column, window } => {
                Box::new(RollingStd::new(column.as_str(), *window)?)
            }
            FeatureSpec::Volatility { column, window } => {
                Box::new(Volatility::new(column.as_str(), *window)?)
            }
            FeatureSpec::Momentum { column, period } => {
                Box::new(Momentum::new(column.as_str(), *period)?)
            }
            FeatureSpec::Rsi { column, period } => Box::new(Rsi::new(column.as_str(), *period)?),
            FeatureSpec::Bollinger {
                column,
                window,
                band,
                num_std,
            } => Box::new(Bollinger::new(column.as_str(), *window, *num_std, *band)?),
            FeatureSpec::Macd {
                column,
                fast,
                slow,
                signal,
            } => Box::new(Macd::new(column.as_str(), *fast, *slow, *signal)?),
            FeatureSpec::RollingSkew { column, window } => {
                Box::new(RollingSkew::new(column.as_str(), *window)?)
            }
            FeatureSpec::RollingKurtosis { column, window } => {
                Box::new(RollingKurtosis::new(column.as_str(), *window)?)
            }
            FeatureSpec::SentimentAggregate {
                column,
                window,
                min_observations,
            } => Box::new(SentimentAggregate::new(
                column.as_str(),
                *window,
                *min_observations,
            )?),
            FeatureSpec::SentimentExtreme { column, window } => {
                Box::new(SentimentExtreme::new(column.as_str(), *window)?)
            }
        };
        Ok(feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_tagged_json() {
        let spec: FeatureSpec =
            serde_json::from_str(r#"{"type":"sma","column":"usdmxn_fix","window":5}"#).unwrap();
        assert_eq!(
            spec,
            FeatureSpec::Sma {
                column: "usdmxn_fix".into(),
                window: 5
            }
        );
        assert_eq!(spec.build().unwrap().name(), "usdmxn_fix_sma_5");
    }

    #[test]
    fn invalid_window_is_reported_not_panicking() {
        let spec = FeatureSpec::RollingKurtosis {
            column: "x".into(),
            window: 3,
        };
        assert!(matches!(
            spec.build(),
            Err(FeatureError::InvalidParameter { ref feature, .. }) if feature == "x_kurt_3"
        ));

        let spec = FeatureSpec::SentimentAggregate {
            column: "s".into(),
            window: 3,
            min_observations: 4,
        };
        assert!(spec.build().is_err());
    }

    #[test]
    fn macd_and_bollinger_take_defaults() {
        let spec: FeatureSpec = serde_json::from_str(r#"{"type":"macd","column":"fix"}"#).unwrap();
        assert_eq!(spec.build().unwrap().name(), "fix_macd_12_26_9");

        let spec: FeatureSpec =
            serde_json::from_str(r#"{"type":"bollinger","column":"fix","window":20,"band":"lower"}"#)
                .unwrap();
        assert!(matches!(spec, FeatureSpec::Bollinger { num_std, .. } if num_std == 2.0));
        let feature = spec.build().unwrap();
        assert_eq!(feature.name(), "fix_bb_lower_20");
        assert_eq!(feature.lookback(), 19);
    }
}
