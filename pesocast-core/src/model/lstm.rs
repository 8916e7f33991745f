//! Single LSTM layer with full backpropagation through time.
//!
//! Gate order in the stacked weight matrices is input, forget, candidate,
//! output: `W` is `(4H, I)`, `U` is `(4H, H)`, `b` is `(4H)`.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    pub w: Array2<f64>,
    pub u: Array2<f64>,
    pub b: Array1<f64>,
}

/// Activations recorded during a forward pass, consumed by `backward`.
#[derive(Debug, Clone)]
pub struct LstmTrace {
    inputs: Array2<f64>,
    /// Row `t + 1` holds `h_t`; row 0 is the zero initial state.
    h: Array2<f64>,
    c: Array2<f64>,
    /// Post-activation gates per step, `(T, 4H)`.
    gates: Array2<f64>,
}

impl LstmTrace {
    /// Hidden states `(T, H)`, one row per step.
    pub fn outputs(&self) -> ArrayView2<'_, f64> {
        self.h.slice(s![1.., ..])
    }

    pub fn last_hidden(&self) -> ArrayView1<'_, f64> {
        self.h.row(self.h.nrows() - 1)
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl LstmLayer {
    /// Uniform(-1/√H, 1/√H) weights, zero biases except the forget gate at 1.
    pub fn init<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        let w = Array2::from_shape_fn((4 * hidden_size, input_size), |_| rng.gen_range(-limit..limit));
        let u = Array2::from_shape_fn((4 * hidden_size, hidden_size), |_| rng.gen_range(-limit..limit));
        let mut b = Array1::zeros(4 * hidden_size);
        b.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);
        Self { w, u, b }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            w: Array2::zeros(self.w.raw_dim()),
            u: Array2::zeros(self.u.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
        }
    }

    pub fn input_size(&self) -> usize {
        self.w.ncols()
    }

    pub fn hidden_size(&self) -> usize {
        self.u.ncols()
    }

    pub fn forward(&self, x: ArrayView2<'_, f64>) -> LstmTrace {
        let steps = x.nrows();
        let hs = self.hidden_size();
        let mut h = Array2::zeros((steps + 1, hs));
        let mut c = Array2::zeros((steps + 1, hs));
        let mut gates = Array2::zeros((steps, 4 * hs));

        for t in 0..steps {
            let z = self.w.dot(&x.row(t)) + self.u.dot(&h.row(t)) + &self.b;
            let mut g = gates.row_mut(t);
            for k in 0..4 * hs {
                g[k] = if (2 * hs..3 * hs).contains(&k) {
                    z[k].tanh()
                } else {
                    sigmoid(z[k])
                };
            }
            for k in 0..hs {
                let (i, f, cand, o) = (g[k], g[hs + k], g[2 * hs + k], g[3 * hs + k]);
                let c_t: f64 = f * c[[t, k]] + i * cand;
                c[[t + 1, k]] = c_t;
                h[[t + 1, k]] = o * c_t.tanh();
            }
        }

        LstmTrace {
            inputs: x.to_owned(),
            h,
            c,
            gates,
        }
    }

    /// Backpropagate `dh` (gradient w.r.t. each step's hidden output, `(T, H)`).
    ///
    /// Returns parameter gradients and the gradient w.r.t. the inputs.
    pub fn backward(&self, trace: &LstmTrace, dh: ArrayView2<'_, f64>) -> (LstmLayer, Array2<f64>) {
        let steps = trace.inputs.nrows();
        let hs = self.hidden_size();
        let mut grads = self.zeros_like();
        let mut dx = Array2::zeros(trace.inputs.raw_dim());
        let mut dh_next = Array1::<f64>::zeros(hs);
        let mut dc_next = Array1::<f64>::zeros(hs);
        let mut dz = Array1::<f64>::zeros(4 * hs);

        for t in (0..steps).rev() {
            let g = trace.gates.row(t);
            for k in 0..hs {
                let (i, f, cand, o) = (g[k], g[hs + k], g[2 * hs + k], g[3 * hs + k]);
                let c_prev = trace.c[[t, k]];
                let tanh_c = trace.c[[t + 1, k]].tanh();
                let dh_t = dh[[t, k]] + dh_next[k];
                let d_o = dh_t * tanh_c;
                let dc = dh_t * o * (1.0 - tanh_c * tanh_c) + dc_next[k];
                dz[k] = dc * cand * i * (1.0 - i);
                dz[hs + k] = dc * c_prev * f * (1.0 - f);
                dz[2 * hs + k] = dc * i * (1.0 - cand * cand);
                dz[3 * hs + k] = d_o * o * (1.0 - o);
                dc_next[k] = dc * f;
            }

            let dz_col = dz.view().insert_axis(Axis(1));
            grads.w += &dz_col.dot(&trace.inputs.row(t).insert_axis(Axis(0)));
            grads.u += &dz_col.dot(&trace.h.row(t).insert_axis(Axis(0)));
            grads.b += &dz;
            dx.row_mut(t).assign(&self.w.t().dot(&dz));
            dh_next = self.u.t().dot(&dz);
        }

        (grads, dx)
    }
}
