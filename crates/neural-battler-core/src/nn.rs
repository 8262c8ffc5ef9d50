//! Q-value network: input → hidden (ReLU) → hidden (ReLU) → one value per action.
//!
//! Dense layers store weights row-major (`out × in`). Parameters are visited in
//! the order fc1.weight, fc1.bias, fc2.weight, fc2.bias, fc3.weight, fc3.bias;
//! optimizer state is laid out the same way.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

impl Linear {
    /// Uniform init in `±1/sqrt(in_features)` for weights and biases.
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        let mut sample = || rng.random_range(-bound..=bound);
        let weight = (0..in_features * out_features).map(|_| sample()).collect();
        let bias = (0..out_features).map(|_| sample()).collect();
        Self {
            in_features,
            out_features,
            weight,
            bias,
        }
    }

    pub fn zeros(in_features: usize, out_features: usize) -> Self {
        Self {
            in_features,
            out_features,
            weight: vec![0.0; in_features * out_features],
            bias: vec![0.0; out_features],
        }
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut out = self.bias.clone();
        for (o, row) in out.iter_mut().zip(self.weight.chunks_exact(self.in_features)) {
            *o += row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>();
        }
        out
    }

    /// Accumulate `dL/dW`, `dL/db` into `grads` and return `dL/dinput`.
    fn backward(&self, input: &[f32], grad_out: &[f32], grads: &mut Linear) -> Vec<f32> {
        let mut grad_in = vec![0.0; self.in_features];
        for (j, &g) in grad_out.iter().enumerate() {
            if g == 0.0 {
                continue;
            }
            grads.bias[j] += g;
            let row = j * self.in_features;
            for (i, &x) in input.iter().enumerate() {
                grads.weight[row + i] += g * x;
                grad_in[i] += g * self.weight[row + i];
            }
        }
        grad_in
    }

    fn is_well_formed(&self) -> bool {
        self.weight.len() == self.in_features * self.out_features
            && self.bias.len() == self.out_features
    }
}

/// Activations kept from a forward pass for backpropagation.
#[derive(Clone, Debug)]
pub struct ForwardCache {
    input: Vec<f32>,
    hidden1: Vec<f32>,
    hidden2: Vec<f32>,
    pub output: Vec<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QNetwork {
    pub fc1: Linear,
    pub fc2: Linear,
    pub fc3: Linear,
}

impl QNetwork {
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        hidden_size: usize,
        output_size: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            fc1: Linear::new(input_size, hidden_size, rng),
            fc2: Linear::new(hidden_size, hidden_size, rng),
            fc3: Linear::new(hidden_size, output_size, rng),
        }
    }

    /// Same shape, all parameters zero. Used as a gradient accumulator.
    pub fn zeros_like(&self) -> Self {
        Self {
            fc1: Linear::zeros(self.fc1.in_features, self.fc1.out_features),
            fc2: Linear::zeros(self.fc2.in_features, self.fc2.out_features),
            fc3: Linear::zeros(self.fc3.in_features, self.fc3.out_features),
        }
    }

    pub fn input_size(&self) -> usize {
        self.fc1.in_features
    }

    pub fn hidden_size(&self) -> usize {
        self.fc1.out_features
    }

    pub fn output_size(&self) -> usize {
        self.fc3.out_features
    }

    /// True when every layer's buffers match its declared shape and the layers chain.
    pub fn is_well_formed(&self) -> bool {
        self.fc1.is_well_formed()
            && self.fc2.is_well_formed()
            && self.fc3.is_well_formed()
            && self.fc1.out_features == self.fc2.in_features
            && self.fc2.out_features == self.fc3.in_features
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }

    pub fn parameters(&self) -> [&[f32]; 6] {
        [
            &self.fc1.weight,
            &self.fc1.bias,
            &self.fc2.weight,
            &self.fc2.bias,
            &self.fc3.weight,
            &self.fc3.bias,
        ]
    }

    pub fn parameters_mut(&mut self) -> [&mut [f32]; 6] {
        [
            &mut self.fc1.weight,
            &mut self.fc1.bias,
            &mut self.fc2.weight,
            &mut self.fc2.bias,
            &mut self.fc3.weight,
            &mut self.fc3.bias,
        ]
    }

    /// Panics when `input.len()` differs from the network's input size.
    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.forward_cached(input).output
    }

    pub fn forward_cached(&self, input: &[f32]) -> ForwardCache {
        assert_eq!(
            input.len(),
            self.input_size(),
            "state vector length must match network input size"
        );
        let hidden1 = relu(self.fc1.forward(input));
        let hidden2 = relu(self.fc2.forward(&hidden1));
        let output = self.fc3.forward(&hidden2);
        ForwardCache {
            input: input.to_vec(),
            hidden1,
            hidden2,
            output,
        }
    }

    /// Backpropagate `grad_output` (dL/dQ) through a cached pass, accumulating into `grads`.
    pub fn backward(&self, cache: &ForwardCache, grad_output: &[f32], grads: &mut QNetwork) {
        let mut g2 = self.fc3.backward(&cache.hidden2, grad_output, &mut grads.fc3);
        relu_backward(&mut g2, &cache.hidden2);
        let mut g1 = self.fc2.backward(&cache.hidden1, &g2, &mut grads.fc2);
        relu_backward(&mut g1, &cache.hidden1);
        self.fc1.backward(&cache.input, &g1, &mut grads.fc1);
    }
}

fn relu(mut v: Vec<f32>) -> Vec<f32> {
    for x in &mut v {
        *x = x.max(0.0);
    }
    v
}

fn relu_backward(grad: &mut [f32], activation: &[f32]) {
    for (g, &a) in grad.iter_mut().zip(activation) {
        if a <= 0.0 {
            *g = 0.0;
        }
    }
}

/// Index of the largest value; the first one wins ties. NaN only wins when every value is NaN.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if !v.is_nan() && (values[best].is_nan() || v > values[best]) {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::create_rng;
    use proptest::prelude::*;

    fn net() -> QNetwork {
        QNetwork::new(4, 8, 3, &mut create_rng(1))
    }

    #[test]
    fn shapes_and_parameter_count() {
        let n = QNetwork::new(28, 64, 10, &mut create_rng(0));
        assert!(n.is_well_formed());
        assert_eq!(n.parameter_count(), 28 * 64 + 64 + 64 * 64 + 64 + 64 * 10 + 10);
        assert_eq!(n.forward(&[0.0; 28]).len(), 10);
    }

    #[test]
    fn init_stays_within_fan_in_bound() {
        let n = QNetwork::new(16, 4, 2, &mut create_rng(5));
        assert!(n.fc1.weight.iter().all(|w| w.abs() <= 0.25));
        assert!(n.fc2.weight.iter().all(|w| w.abs() <= 0.5));
    }

    #[test]
    fn zero_network_outputs_zero() {
        let n = net().zeros_like();
        assert_eq!(n.forward(&[1.0, -2.0, 3.0, 0.5]), vec![0.0; 3]);
    }

    #[test]
    #[should_panic(expected = "must match network input size")]
    fn wrong_input_width_panics() {
        net().forward(&[0.0; 5]);
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), 1);
        assert_eq!(argmax(&[5.0]), 0);
        assert_eq!(argmax(&[f32::NAN, 1.0, 0.0]), 1);
    }

    #[test]
    fn malformed_network_is_detected() {
        let mut n = net();
        n.fc2.bias.pop();
        assert!(!n.is_well_formed());
    }

    #[test]
    fn backward_matches_finite_differences() {
        let n = net();
        let input = [0.3f32, -0.7, 0.9, 0.1];
        let action = 1;
        // L = 0.5 * Q(s, a)^2, so dL/dQ = Q.
        let cache = n.forward_cached(&input);
        let q = cache.output[action];
        let mut grad_out = vec![0.0; 3];
        grad_out[action] = q;
        let mut grads = n.zeros_like();
        n.backward(&cache, &grad_out, &mut grads);

        let loss = |net: &QNetwork| {
            let q = net.forward(&input)[action] as f64;
            0.5 * q * q
        };
        let eps = 1e-3f32;
        for (layer, idx) in [(0usize, 3usize), (2, 10), (4, 5), (5, 1)] {
            let mut plus = n.clone();
            plus.parameters_mut()[layer][idx] += eps;
            let mut minus = n.clone();
            minus.parameters_mut()[layer][idx] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps as f64);
            let analytic = grads.parameters()[layer][idx] as f64;
            assert!(
                (numeric - analytic).abs() < 1e-2 * (1.0 + numeric.abs()),
                "param ({layer},{idx}): numeric {numeric} vs analytic {analytic}"
            );
        }
    }

    #[test]
    fn serde_round_trip_is_exact() {
        let n = QNetwork::new(28, 64, 10, &mut create_rng(9));
        let json = serde_json::to_string(&n).expect("serialize");
        let back: QNetwork = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, n);
    }

    proptest! {
        #[test]
        fn outputs_are_finite_for_bounded_inputs(
            seed in any::<u64>(),
            inputs in proptest::collection::vec(-1.0f32..1.0, 28),
        ) {
            let n = QNetwork::new(28, 64, 10, &mut create_rng(seed));
            let out = n.forward(&inputs);
            prop_assert_eq!(out.len(), 10);
            prop_assert!(out.iter().all(|q| q.is_finite()));
        }
    }
}
