use crate::config::{AgentConfig, ConfigError};
use crate::constants::AGENT_RNG_STREAM;
use crate::nn::{argmax, QNetwork};
use crate::optim::Adam;
use crate::persist::atomic_write;
use crate::replay::{Experience, ReplayBuffer};
use crate::rng::derive_rng;
use rand::Rng;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{what} mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("checkpoint not found: {}", .0.display())]
    MissingCheckpoint(PathBuf),
    #[error("checkpoint {} has inconsistent parameter buffers", .path.display())]
    MalformedCheckpoint { path: PathBuf },
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk checkpoint: network weights plus optimiser state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub policy_network: QNetwork,
    pub optimizer: Adam,
}

#[derive(Serialize)]
struct CheckpointRef<'a> {
    policy_network: &'a QNetwork,
    optimizer: &'a Adam,
}

/// Value-based learner: one Q-network, Adam, and a bounded replay buffer.
///
/// Bootstrap targets come from the same network that is being trained; there is
/// no separate target network.
#[derive(Clone, Debug)]
pub struct DqnAgent {
    config: AgentConfig,
    network: QNetwork,
    optimizer: Adam,
    memory: ReplayBuffer,
    rng: ChaCha12Rng,
}

impl DqnAgent {
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        config.validate()?;
        let mut rng = derive_rng(config.seed, AGENT_RNG_STREAM);
        let network = QNetwork::new(
            config.state_size,
            config.hidden_size,
            config.action_size,
            &mut rng,
        );
        let optimizer = Adam::new(&network, config.learning_rate);
        let memory = ReplayBuffer::new(config.replay_capacity);
        Ok(Self {
            config,
            network,
            optimizer,
            memory,
            rng,
        })
    }

    /// Build an agent and immediately load `path` into it.
    pub fn from_checkpoint(config: AgentConfig, path: &Path) -> Result<Self, AgentError> {
        let mut agent = Self::new(config)?;
        agent.load(path)?;
        Ok(agent)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn network(&self) -> &QNetwork {
        &self.network
    }

    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    /// Panics when `state` does not have `state_size` entries.
    pub fn q_values(&self, state: &[f32]) -> Vec<f32> {
        self.network.forward(state)
    }

    /// Highest-valued action; the first maximum wins ties.
    pub fn greedy_action(&self, state: &[f32]) -> usize {
        argmax(&self.q_values(state))
    }

    /// Epsilon-greedy: a uniformly random action with probability `epsilon`.
    pub fn select_action(&mut self, state: &[f32], epsilon: f64) -> usize {
        if self.rng.random::<f64>() < epsilon {
            self.rng.random_range(0..self.config.action_size)
        } else {
            self.greedy_action(state)
        }
    }

    pub fn store(
        &mut self,
        state: Vec<f32>,
        action: usize,
        reward: f32,
        next_state: Vec<f32>,
        done: bool,
    ) {
        assert!(
            state.len() == self.config.state_size && next_state.len() == self.config.state_size,
            "stored states must have state_size entries"
        );
        assert!(action < self.config.action_size, "action index {action} out of range");
        self.memory.push(Experience {
            state,
            action,
            reward,
            next_state,
            done,
        });
    }

    /// One gradient step on a minibatch sampled without replacement.
    ///
    /// Returns the mean Huber loss, or `None` (and leaves the network
    /// untouched) while fewer than `batch_size` experiences are stored.
    pub fn train(&mut self, batch_size: usize) -> Option<f32> {
        if batch_size == 0 {
            return None;
        }
        let batch = self.memory.sample(&mut self.rng, batch_size)?;
        let scale = 1.0 / batch.len() as f32;
        let gamma = self.config.gamma;
        let mut grads = self.network.zeros_like();
        let mut loss = 0.0f32;

        for experience in &batch {
            let next_max = if experience.done {
                0.0
            } else {
                self.network
                    .forward(&experience.next_state)
                    .into_iter()
                    .fold(f32::NEG_INFINITY, f32::max)
            };
            let target = experience.reward + gamma * next_max;
            let cache = self.network.forward_cached(&experience.state);
            let error = cache.output[experience.action] - target;
            loss += huber(error);

            let mut grad_output = vec![0.0; cache.output.len()];
            grad_output[experience.action] = error.clamp(-1.0, 1.0) * scale;
            self.network.backward(&cache, &grad_output, &mut grads);
        }

        self.optimizer.step(&mut self.network, &grads);
        Some(loss * scale)
    }

    /// Atomically write the network and optimiser state to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<(), AgentError> {
        let checkpoint = CheckpointRef {
            policy_network: &self.network,
            optimizer: &self.optimizer,
        };
        let bytes = serde_json::to_vec_pretty(&checkpoint)?;
        atomic_write(path, &bytes).map_err(|source| AgentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), step = self.optimizer.step, "checkpoint saved");
        Ok(())
    }

    /// Replace network and optimiser state from `path`. Every shape is checked
    /// before anything is replaced; on error the agent is unchanged.
    pub fn load(&mut self, path: &Path) -> Result<(), AgentError> {
        if !path.exists() {
            return Err(AgentError::MissingCheckpoint(path.to_path_buf()));
        }
        let bytes = std::fs::read(path).map_err(|source| AgentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
        let network = &checkpoint.policy_network;

        if !network.is_well_formed() || !checkpoint.optimizer.matches(network) {
            return Err(AgentError::MalformedCheckpoint {
                path: path.to_path_buf(),
            });
        }
        for (what, expected, actual) in [
            ("state_size", self.config.state_size, network.input_size()),
            ("hidden_size", self.config.hidden_size, network.hidden_size()),
            ("action_size", self.config.action_size, network.output_size()),
        ] {
            if expected != actual {
                return Err(AgentError::DimensionMismatch {
                    what,
                    expected,
                    actual,
                });
            }
        }

        self.network = checkpoint.policy_network;
        self.optimizer = checkpoint.optimizer;
        debug!(path = %path.display(), step = self.optimizer.step, "checkpoint loaded");
        Ok(())
    }
}

/// Smooth L1 with a threshold of 1.
fn huber(error: f32) -> f32 {
    let abs = error.abs();
    if abs < 1.0 {
        0.5 * error * error
    } else {
        abs - 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> AgentConfig {
        AgentConfig {
            state_size: 4,
            action_size: 3,
            hidden_size: 8,
            replay_capacity: 32,
            ..AgentConfig::default()
        }
    }

    fn state(seed: f32) -> Vec<f32> {
        vec![seed, -seed, 0.5 * seed, 1.0 - seed]
    }

    #[test]
    fn default_agent_matches_canonical_shape() {
        let agent = DqnAgent::new(AgentConfig::default()).expect("agent");
        assert_eq!(agent.network().input_size(), 28);
        assert_eq!(agent.network().hidden_size(), 64);
        assert_eq!(agent.network().output_size(), 10);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = AgentConfig {
            hidden_size: 0,
            ..small_config()
        };
        assert!(matches!(
            DqnAgent::new(config),
            Err(AgentError::Config(ConfigError::InvalidNetworkShape))
        ));
    }

    #[test]
    fn zero_epsilon_is_greedy_and_full_epsilon_stays_in_range() {
        let mut agent = DqnAgent::new(small_config()).expect("agent");
        let s = state(0.3);
        let greedy = agent.greedy_action(&s);
        for _ in 0..20 {
            assert_eq!(agent.select_action(&s, 0.0), greedy);
        }
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[agent.select_action(&s, 1.0)] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn huber_is_quadratic_then_linear() {
        assert_eq!(huber(0.5), 0.125);
        assert_eq!(huber(-3.0), 2.5);
        assert_eq!(huber(1.0), 0.5);
    }

    #[test]
    fn train_below_batch_size_is_a_no_op() {
        let mut agent = DqnAgent::new(small_config()).expect("agent");
        for i in 0..3 {
            agent.store(state(i as f32 * 0.1), i % 3, 1.0, state(0.9), false);
        }
        let before = agent.network().clone();
        assert_eq!(agent.train(4), None);
        assert_eq!(agent.network(), &before);
        assert_eq!(agent.optimizer().step, 0);
    }

    #[test]
    fn repeated_training_reduces_loss_on_fixed_targets() {
        let config = AgentConfig {
            learning_rate: 0.01,
            ..small_config()
        };
        let mut agent = DqnAgent::new(config).expect("agent");
        for i in 0..4 {
            agent.store(state(i as f32 * 0.2), i % 3, 2.0 - i as f32, state(0.0), true);
        }
        let first = agent.train(4).expect("loss");
        let mut last = first;
        for _ in 0..300 {
            last = agent.train(4).expect("loss");
        }
        assert!(last < first, "loss did not decrease: {first} -> {last}");
        assert!(last.is_finite());
    }

    #[test]
    #[should_panic(expected = "state_size")]
    fn storing_wrong_width_panics() {
        let mut agent = DqnAgent::new(small_config()).expect("agent");
        agent.store(vec![0.0; 5], 0, 0.0, vec![0.0; 4], false);
    }

    #[test]
    fn save_load_save_is_bit_identical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut agent = DqnAgent::new(small_config()).expect("agent");
        for i in 0..8 {
            agent.store(state(i as f32 * 0.1), i % 3, 0.5, state(0.7), i % 2 == 0);
        }
        agent.train(8).expect("loss");

        let first = dir.path().join("a.json");
        let second = dir.path().join("b.json");
        agent.save(&first).expect("save");
        let loaded = DqnAgent::from_checkpoint(
            AgentConfig {
                seed: 99,
                ..small_config()
            },
            &first,
        )
        .expect("load");
        loaded.save(&second).expect("save again");

        let a = std::fs::read(&first).expect("read a");
        let b = std::fs::read(&second).expect("read b");
        assert_eq!(a, b);
        assert_eq!(loaded.q_values(&state(0.4)), agent.q_values(&state(0.4)));

        let keys: serde_json::Value = serde_json::from_slice(&a).expect("json");
        assert!(keys.get("policy_network").is_some());
        assert!(keys.get("optimizer").is_some());
    }

    #[test]
    fn missing_checkpoint_names_the_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nope.json");
        let mut agent = DqnAgent::new(small_config()).expect("agent");
        let err = agent.load(&path).expect_err("should fail");
        assert!(matches!(&err, AgentError::MissingCheckpoint(p) if p == &path));
        assert!(err.to_string().contains("nope.json"));
    }

    #[test]
    fn shape_mismatch_fails_without_partial_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wide.json");
        let wide = DqnAgent::new(AgentConfig {
            state_size: 6,
            ..small_config()
        })
        .expect("agent");
        wide.save(&path).expect("save");

        let mut agent = DqnAgent::new(small_config()).expect("agent");
        let before = agent.network().clone();
        let err = agent.load(&path).expect_err("should fail");
        assert!(matches!(
            err,
            AgentError::DimensionMismatch {
                what: "state_size",
                expected: 4,
                actual: 6
            }
        ));
        assert_eq!(agent.network(), &before);
    }

    #[test]
    fn truncated_buffers_are_reported_as_malformed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        let agent = DqnAgent::new(small_config()).expect("agent");
        let mut checkpoint = Checkpoint {
            policy_network: agent.network().clone(),
            optimizer: agent.optimizer().clone(),
        };
        checkpoint.policy_network.fc2.weight.pop();
        std::fs::write(&path, serde_json::to_vec(&checkpoint).expect("json")).expect("write");

        let mut fresh = DqnAgent::new(small_config()).expect("agent");
        assert!(matches!(
            fresh.load(&path),
            Err(AgentError::MalformedCheckpoint { .. })
        ));
    }
}
