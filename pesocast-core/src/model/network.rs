//! Stacked LSTM encoder with a dense regression head.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewD, ArrayViewMutD};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::dense::{Activation, Dense};
use super::lstm::LstmLayer;
use super::ModelConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub layers: Vec<LstmLayer>,
    pub hidden: Option<Dense>,
    pub output: Dense,
}

impl Network {
    pub fn init<R: Rng>(inputs: usize, config: &ModelConfig, rng: &mut R) -> Self {
        let mut layers = Vec::with_capacity(config.num_layers);
        let mut width = inputs;
        for _ in 0..config.num_layers {
            layers.push(LstmLayer::init(width, config.hidden_size, rng));
            width = config.hidden_size;
        }
        let hidden = config.dense_size.map(|size| {
            let layer = Dense::init(width, size, Activation::Relu, rng);
            width = size;
            layer
        });
        let output = Dense::init(width, 1, Activation::Linear, rng);
        Self {
            layers,
            hidden,
            output,
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            layers: self.layers.iter().map(LstmLayer::zeros_like).collect(),
            hidden: self.hidden.as_ref().map(Dense::zeros_like),
            output: self.output.zeros_like(),
        }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, LstmLayer::input_size)
    }

    /// Width of the encoder's final hidden vector (the dropout site).
    pub fn encoding_size(&self) -> usize {
        self.layers.last().map_or(0, LstmLayer::hidden_size)
    }

    /// Inference forward pass over a scaled `(T, inputs)` sequence.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> f64 {
        let encoded = self.encode(x);
        self.head(encoded.view()).0
    }

    fn encode(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let mut seq = x.to_owned();
        for layer in &self.layers {
            seq = layer.forward(seq.view()).outputs().to_owned();
        }
        seq.row(seq.nrows() - 1).to_owned()
    }

    /// Returns the scalar output and the hidden dense activation, if any.
    fn head(&self, encoded: ArrayView1<'_, f64>) -> (f64, Option<Array1<f64>>) {
        match &self.hidden {
            Some(hidden) => {
                let a = hidden.forward(encoded);
                (self.output.forward(a.view())[0], Some(a))
            }
            None => (self.output.forward(encoded)[0], None),
        }
    }

    /// Squared error of one sample and its parameter gradients.
    ///
    /// `mask` is an inverted-dropout mask over the final hidden vector
    /// (entries 0 or `1 / (1 - p)`); `None` disables dropout.
    pub fn loss_and_grad(
        &self,
        x: ArrayView2<'_, f64>,
        target: f64,
        mask: Option<&Array1<f64>>,
    ) -> (f64, Network) {
        let mut traces = Vec::with_capacity(self.layers.len());
        let mut seq = x.to_owned();
        for layer in &self.layers {
            let trace = layer.forward(seq.view());
            seq = trace.outputs().to_owned();
            traces.push(trace);
        }
        let steps = seq.nrows();
        let last = seq.row(steps - 1).to_owned();
        let encoded = match mask {
            Some(m) => &last * m,
            None => last,
        };

        let (y, hidden_out) = self.head(encoded.view());
        let err = y - target;
        let loss = err * err;

        let mut grads = self.zeros_like();
        let dy = Array1::from_elem(1, 2.0 * err);
        let head_input = hidden_out.as_ref().map_or(encoded.view(), |a| a.view());
        let y_arr = Array1::from_elem(1, y);
        let (g_out, mut d_enc) = self.output.backward(head_input, y_arr.view(), dy.view());
        grads.output = g_out;
        if let (Some(hidden), Some(a)) = (&self.hidden, &hidden_out) {
            let (g_hidden, dx) = hidden.backward(encoded.view(), a.view(), d_enc.view());
            grads.hidden = Some(g_hidden);
            d_enc = dx;
        }
        if let Some(m) = mask {
            d_enc = d_enc * m;
        }

        let mut dh = Array2::zeros((steps, self.encoding_size()));
        dh.row_mut(steps - 1).assign(&d_enc);
        for (i, (layer, trace)) in self.layers.iter().zip(&traces).enumerate().rev() {
            let (g, dx) = layer.backward(trace, dh.view());
            grads.layers[i] = g;
            dh = dx;
        }

        (loss, grads)
    }

    /// Every parameter tensor, in a fixed order.
    pub fn tensors(&self) -> Vec<ArrayViewD<'_, f64>> {
        let mut out = Vec::new();
        for l in &self.layers {
            out.push(l.w.view().into_dyn());
            out.push(l.u.view().into_dyn());
            out.push(l.b.view().into_dyn());
        }
        for d in self.hidden.iter().chain(std::iter::once(&self.output)) {
            out.push(d.w.view().into_dyn());
            out.push(d.b.view().into_dyn());
        }
        out
    }

    /// Mutable counterpart of [`Network::tensors`], same order.
    pub fn tensors_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut out = Vec::new();
        for l in &mut self.layers {
            out.push(l.w.view_mut().into_dyn());
            out.push(l.u.view_mut().into_dyn());
            out.push(l.b.view_mut().into_dyn());
        }
        for d in self.hidden.iter_mut().chain(std::iter::once(&mut self.output)) {
            out.push(d.w.view_mut().into_dyn());
            out.push(d.b.view_mut().into_dyn());
        }
        out
    }

    /// `self += other`, tensor by tensor.
    pub fn accumulate(&mut self, other: &Network) {
        for (mut a, b) in self.tensors_mut().into_iter().zip(other.tensors()) {
            a += &b;
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for mut t in self.tensors_mut() {
            t.mapv_inplace(|v| v * factor);
        }
    }

    pub fn l2_norm(&self) -> f64 {
        self.tensors()
            .iter()
            .flat_map(|t| t.iter())
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.tensors().iter().all(|t| t.iter().all(|v| v.is_finite()))
    }

    pub fn parameter_count(&self) -> usize {
        self.tensors().iter().map(|t| t.len()).sum()
    }
}
