use crate::nn::QNetwork;
use serde::{Deserialize, Serialize};

/// Adam with bias correction. Moment buffers follow the network's parameter order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Adam {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    pub step: u64,
    pub exp_avg: Vec<Vec<f32>>,
    pub exp_avg_sq: Vec<Vec<f32>>,
}

impl Adam {
    pub fn new(network: &QNetwork, learning_rate: f32) -> Self {
        let zeros: Vec<Vec<f32>> = network
            .parameters()
            .iter()
            .map(|p| vec![0.0; p.len()])
            .collect();
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            step: 0,
            exp_avg: zeros.clone(),
            exp_avg_sq: zeros,
        }
    }

    /// True when the moment buffers have the network's parameter shapes.
    pub fn matches(&self, network: &QNetwork) -> bool {
        let params = network.parameters();
        self.exp_avg.len() == params.len()
            && self.exp_avg_sq.len() == params.len()
            && params
                .iter()
                .zip(self.exp_avg.iter().zip(&self.exp_avg_sq))
                .all(|(p, (m, v))| m.len() == p.len() && v.len() == p.len())
    }

    /// One update of `network` from accumulated gradients of the same shape.
    pub fn step(&mut self, network: &mut QNetwork, grads: &QNetwork) {
        self.step += 1;
        let t = self.step as i32;
        let bias_correction1 = 1.0 - self.beta1.powi(t);
        let bias_correction2_sqrt = (1.0 - self.beta2.powi(t)).sqrt();
        let step_size = self.learning_rate / bias_correction1;

        for (((param, grad), m), v) in network
            .parameters_mut()
            .into_iter()
            .zip(grads.parameters())
            .zip(self.exp_avg.iter_mut())
            .zip(self.exp_avg_sq.iter_mut())
        {
            for i in 0..param.len() {
                let g = grad[i];
                m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * g;
                v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * g * g;
                let denom = v[i].sqrt() / bias_correction2_sqrt + self.eps;
                param[i] -= step_size * m[i] / denom;
            }
        }
    }
}
