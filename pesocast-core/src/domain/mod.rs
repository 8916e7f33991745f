//! Domain types shared by every pipeline stage.

pub mod ids;
pub mod prediction;
pub mod series;

pub use ids::{ConfigHash, DatasetHash, ModelVersion};
pub use prediction::{Prediction, Signal};
pub use series::{Aggregation, RawSeries, SourceTag, TimeSeriesPoint};
