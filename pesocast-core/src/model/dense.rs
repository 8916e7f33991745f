//! Fully connected layer.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    /// `(outputs, inputs)`
    pub w: Array2<f64>,
    pub b: Array1<f64>,
    pub activation: Activation,
}

impl Dense {
    pub fn init<R: Rng>(inputs: usize, outputs: usize, activation: Activation, rng: &mut R) -> Self {
        let limit = (1.0 / inputs as f64).sqrt();
        Self {
            w: Array2::from_shape_fn((outputs, inputs), |_| rng.gen_range(-limit..limit)),
            b: Array1::zeros(outputs),
            activation,
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            w: Array2::zeros(self.w.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
            activation: self.activation,
        }
    }

    pub fn outputs(&self) -> usize {
        self.w.nrows()
    }

    /// Returns the activated output.
    pub fn forward(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let z = self.w.dot(&x) + &self.b;
        match self.activation {
            Activation::Linear => z,
            Activation::Relu => z.mapv(|v| v.max(0.0)),
        }
    }

    /// Gradients given the layer input `x`, its activated output `y` and
    /// `dy`. Returns `(param grads, dx)`.
    pub fn backward(
        &self,
        x: ArrayView1<'_, f64>,
        y: ArrayView1<'_, f64>,
        dy: ArrayView1<'_, f64>,
    ) -> (Dense, Array1<f64>) {
        let dz = match self.activation {
            Activation::Linear => dy.to_owned(),
            Activation::Relu => {
                let mut dz = dy.to_owned();
                dz.zip_mut_with(&y, |d, &out| {
                    if out <= 0.0 {
                        *d = 0.0;
                    }
                });
                dz
            }
        };
        let grads = Dense {
            w: dz.view().insert_axis(Axis(1)).dot(&x.insert_axis(Axis(0))),
            b: dz.clone(),
            activation: self.activation,
        };
        let dx = self.w.t().dot(&dz);
        (grads, dx)
    }
}
