//! Adam with optional global-norm gradient clipping.

use ndarray::Zip;

use crate::model::Network;

#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    step: i32,
    m: Network,
    v: Network,
}

impl Adam {
    pub fn new(learning_rate: f64, like: &Network) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            m: like.zeros_like(),
            v: like.zeros_like(),
        }
    }

    pub fn steps(&self) -> i32 {
        self.step
    }

    pub fn step(&mut self, params: &mut Network, grads: &Network) {
        self.step = self.step.saturating_add(1);
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let bias1 = 1.0 - b1.powi(self.step);
        let bias2 = 1.0 - b2.powi(self.step);
        let lr = self.learning_rate;

        let mut ms = self.m.tensors_mut();
        let mut vs = self.v.tensors_mut();
        for (((p, g), m), v) in params
            .tensors_mut()
            .into_iter()
            .zip(grads.tensors())
            .zip(ms.iter_mut())
            .zip(vs.iter_mut())
        {
            Zip::from(p).and(&g).and(m).and(v).for_each(|p, &g, m, v| {
                *m = b1 * *m + (1.0 - b1) * g;
                *v = b2 * *v + (1.0 - b2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
        }
    }
}

/// Rescale `grads` so their global L2 norm is at most `max_norm`.
/// Returns the norm before clipping.
pub fn clip_global_norm(grads: &mut Network, max_norm: f64) -> f64 {
    let norm = grads.l2_norm();
    if norm > max_norm && norm > 0.0 {
        grads.scale(max_norm / norm);
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn net() -> Network {
        let cfg = ModelConfig {
            hidden_size: 2,
            num_layers: 1,
            dense_size: None,
            dropout: 0.0,
            ..ModelConfig::default()
        };
        Network::init(1, &cfg, &mut StdRng::seed_from_u64(0))
    }

    #[test]
    fn first_step_moves_by_learning_rate() {
        let mut params = net();
        let before = params.clone();
        let mut grads = params.zeros_like();
        grads.output.b[0] = 0.5;
        let mut adam = Adam::new(0.01, &params);
        adam.step(&mut params, &grads);
        // bias-corrected first step is lr * sign(g)
        assert!((before.output.b[0] - params.output.b[0] - 0.01).abs() < 1e-6);
        assert_eq!(before.output.w, params.output.w);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn clipping_bounds_norm() {
        let mut grads = net().zeros_like();
        grads.output.b[0] = 3.0;
        grads.output.w[[0, 0]] = 4.0;
        let norm = clip_global_norm(&mut grads, 1.0);
        assert!((norm - 5.0).abs() < 1e-12);
        assert!((grads.l2_norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn clipping_leaves_small_gradients() {
        let mut grads = net().zeros_like();
        grads.output.b[0] = 0.1;
        clip_global_norm(&mut grads, 1.0);
        assert_eq!(grads.output.b[0], 0.1);
    }
}
