//! Z-score statistics frozen at training time.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Mean and population std; a zero or non-finite std is stored as 1.
fn moments<I: Iterator<Item = f64>>(values: I) -> (f64, f64) {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    (mean, if std > 0.0 && std.is_finite() { std } else { 1.0 })
}

/// Per-column statistics for the model inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl FeatureScaler {
    /// Fit over the rows of the training partition.
    pub fn fit(rows: ArrayView2<'_, f64>) -> Self {
        let (means, stds) = rows
            .axis_iter(Axis(1))
            .map(|col| moments(col.iter().copied()))
            .unzip();
        Self { means, stds }
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = x.to_owned();
        for (c, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (self.means[c], self.stds[c]);
            col.mapv_inplace(|v| (v - m) / s);
        }
        out
    }
}

/// Statistics of the regression target (level or delta).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetScaler {
    pub mean: f64,
    pub std: f64,
}

impl TargetScaler {
    pub fn fit(values: &[f64]) -> Self {
        let (mean, std) = moments(values.iter().copied());
        Self { mean, std }
    }

    pub fn transform(&self, v: f64) -> f64 {
        (v - self.mean) / self.std
    }

    pub fn inverse(&self, z: f64) -> f64 {
        z * self.std + self.mean
    }
}
