use crate::agent::{AgentError, DqnAgent};
use crate::config::{AgentConfig, ConfigError, EnvConfig, TrainingConfig};
use crate::constants::{CHECKPOINT_PREFIX, TRAILING_REWARD_WINDOW};
use crate::environment::{Environment, EnvironmentError};
use crate::metrics::{mean_std, EpisodeRecord, TrainingReport};
use crate::persist::{stamped_name, write_json};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error("encoder produces {encoder} features but the agent expects {agent}")]
    EncoderMismatch { encoder: usize, agent: usize },
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `run_<YYYYmmdd_HHMMSS>_<pid>_<n>`; see [`stamped_name`].
pub fn new_run_id() -> String {
    stamped_name("run")
}

/// `<dir>/immune_cell_model_<label>.json`
pub fn checkpoint_path(dir: &Path, label: &str) -> PathBuf {
    dir.join(format!("{CHECKPOINT_PREFIX}_{label}.json"))
}

/// Epsilon-greedy DQN loop over one [`Environment`] and one [`DqnAgent`].
///
/// Every run writes into `<output_dir>/<run_id>/`: periodic checkpoints
/// `immune_cell_model_ep<N>.json`, the final `immune_cell_model_final.json`
/// and `training_report.json`.
pub struct Trainer {
    env: Environment,
    agent: DqnAgent,
    config: TrainingConfig,
    run_id: String,
    epsilon: f64,
}

impl Trainer {
    pub fn new(
        env_config: EnvConfig,
        agent_config: AgentConfig,
        config: TrainingConfig,
    ) -> Result<Self, TrainingError> {
        let env = Environment::new(env_config)?;
        let agent = DqnAgent::new(agent_config)?;
        Self::from_parts(env, agent, config)
    }

    /// Checks that the encoder and the network agree on the state width, then
    /// loads `resume_from` if set.
    pub fn from_parts(
        env: Environment,
        mut agent: DqnAgent,
        config: TrainingConfig,
    ) -> Result<Self, TrainingError> {
        config.validate()?;
        let (encoder, expected) = (env.state_size(), agent.config().state_size);
        if encoder != expected {
            return Err(TrainingError::EncoderMismatch {
                encoder,
                agent: expected,
            });
        }
        if let Some(path) = &config.resume_from {
            agent.load(path)?;
            info!(path = %path.display(), "resuming from checkpoint");
        }
        Ok(Self {
            env,
            agent,
            epsilon: config.epsilon_start,
            config,
            run_id: new_run_id(),
        })
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> PathBuf {
        self.config.output_dir.join(&self.run_id)
    }

    pub fn agent(&self) -> &DqnAgent {
        &self.agent
    }

    pub fn into_agent(self) -> DqnAgent {
        self.agent
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Train for `config.episodes` episodes and write every artefact of the run.
    pub fn run(&mut self) -> Result<TrainingReport, TrainingError> {
        let run_dir = self.run_dir();
        std::fs::create_dir_all(&run_dir).map_err(|source| TrainingError::Io {
            path: run_dir.clone(),
            source,
        })?;
        info!(
            run_id = %self.run_id,
            episodes = self.config.episodes,
            batch_size = self.config.batch_size,
            "training started"
        );

        let mut records = Vec::with_capacity(self.config.episodes);
        for episode in 1..=self.config.episodes {
            let record = self.run_episode(episode)?;
            debug!(
                episode,
                reward = record.total_reward,
                steps = record.steps,
                epsilon = record.epsilon,
                loss = ?record.mean_loss,
                "episode finished"
            );
            records.push(record);

            if episode % self.config.save_interval == 0 {
                let path = checkpoint_path(&run_dir, &format!("ep{episode}"));
                self.agent.save(&path)?;
                let tail = &records[records.len().saturating_sub(TRAILING_REWARD_WINDOW)..];
                let rewards: Vec<f64> = tail.iter().map(|r| r.total_reward).collect();
                info!(
                    episode,
                    total = self.config.episodes,
                    avg_reward = mean_std(&rewards).0,
                    "checkpoint written"
                );
            }
        }

        let final_checkpoint = checkpoint_path(&run_dir, "final");
        self.agent.save(&final_checkpoint)?;

        let rewards: Vec<f64> = records.iter().map(|r| r.total_reward).collect();
        let steps: Vec<f64> = records.iter().map(|r| r.steps as f64).collect();
        let report = TrainingReport {
            schema_version: 1,
            run_id: self.run_id.clone(),
            run_dir: run_dir.clone(),
            final_checkpoint,
            final_epsilon: self.epsilon,
            best_reward: rewards.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            avg_reward: mean_std(&rewards).0,
            avg_steps: mean_std(&steps).0,
            episodes: records,
        };
        let report_path = run_dir.join("training_report.json");
        write_json(&report_path, &report).map_err(|source| TrainingError::Io {
            path: report_path,
            source,
        })?;
        info!(
            run_id = %self.run_id,
            avg_reward = report.avg_reward,
            best_reward = report.best_reward,
            "training finished"
        );
        Ok(report)
    }

    /// One episode. Epsilon decays before the first step; the agent trains
    /// once per step as soon as the buffer holds more than a batch.
    pub fn run_episode(&mut self, episode: usize) -> Result<EpisodeRecord, TrainingError> {
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        let mut state = self.env.reset();
        let mut total_reward = 0.0;
        let mut losses = Vec::new();
        let mut pathogens_killed = 0;
        let mut remaining_pathogens = self.env.tissue().pathogens().len();

        loop {
            let action = self.agent.select_action(&state, self.epsilon);
            let outcome = self.env.step(action)?;
            self.agent.store(
                state,
                action,
                outcome.reward as f32,
                outcome.state.clone(),
                outcome.done,
            );
            if self.agent.memory().len() > self.config.batch_size {
                if let Some(loss) = self.agent.train(self.config.batch_size) {
                    losses.push(loss);
                }
            }

            total_reward += outcome.reward;
            pathogens_killed += outcome.info.kills;
            remaining_pathogens = outcome.info.pathogen_count;
            state = outcome.state;
            if outcome.done {
                break;
            }
        }

        let mean_loss = if losses.is_empty() {
            None
        } else {
            Some(losses.iter().sum::<f32>() / losses.len() as f32)
        };
        Ok(EpisodeRecord {
            episode,
            total_reward,
            steps: self.env.steps(),
            epsilon: self.epsilon,
            mean_loss,
            pathogens_killed,
            remaining_pathogens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::StateEncoder;
    use crate::reward::ShapedReward;

    fn short_env() -> EnvConfig {
        EnvConfig {
            max_steps: 30,
            ..EnvConfig::default()
        }
    }

    fn short_training(output_dir: &Path) -> TrainingConfig {
        TrainingConfig {
            episodes: 3,
            batch_size: 8,
            save_interval: 2,
            output_dir: output_dir.to_path_buf(),
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn smoke_run_writes_checkpoints_and_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut trainer = Trainer::new(short_env(), AgentConfig::default(), short_training(dir.path()))
            .expect("trainer")
            .with_run_id("run_test");
        let report = trainer.run().expect("run");

        let run_dir = dir.path().join("run_test");
        assert_eq!(report.run_dir, run_dir);
        assert_eq!(report.episodes.len(), 3);
        assert!(checkpoint_path(&run_dir, "ep2").exists());
        assert!(!checkpoint_path(&run_dir, "ep3").exists());
        assert!(report.final_checkpoint.exists());
        assert!(run_dir.join("training_report.json").exists());

        let expected_epsilon = 0.995f64.powi(3);
        assert!((report.final_epsilon - expected_epsilon).abs() < 1e-12);
        for (i, record) in report.episodes.iter().enumerate() {
            assert_eq!(record.episode, i + 1);
            assert!(record.steps >= 1 && record.steps <= 30);
            assert!(record.total_reward.is_finite());
        }
        assert!(report.episodes.iter().any(|r| r.mean_loss.is_some()));

        let reloaded = DqnAgent::from_checkpoint(AgentConfig::default(), &report.final_checkpoint)
            .expect("final checkpoint loads");
        assert_eq!(reloaded.network(), trainer.agent().network());
    }

    #[test]
    fn epsilon_never_drops_below_floor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = TrainingConfig {
            epsilon_start: 0.02,
            epsilon_min: 0.01,
            epsilon_decay: 0.5,
            ..short_training(dir.path())
        };
        let mut trainer = Trainer::new(
            EnvConfig {
                max_steps: 2,
                ..EnvConfig::default()
            },
            AgentConfig::default(),
            config,
        )
        .expect("trainer");
        for episode in 1..=4 {
            let record = trainer.run_episode(episode).expect("episode");
            assert!(record.epsilon >= 0.01);
        }
        assert_eq!(trainer.epsilon(), 0.01);
    }

    struct Narrow;

    impl StateEncoder for Narrow {
        fn state_size(&self) -> usize {
            3
        }

        fn encode(
            &self,
            _cell: &crate::cell::ImmuneCell,
            _pathogens: &[crate::pathogen::Pathogen],
            _width: f64,
            _height: f64,
        ) -> Vec<f32> {
            vec![0.0; 3]
        }
    }

    #[test]
    fn encoder_width_must_match_agent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = Environment::with_policies(
            EnvConfig::default(),
            Box::new(Narrow),
            Box::new(ShapedReward::default()),
        )
        .expect("env");
        let agent = DqnAgent::new(AgentConfig::default()).expect("agent");
        let err = Trainer::from_parts(env, agent, short_training(dir.path()))
            .err()
            .expect("should fail");
        assert!(matches!(
            err,
            TrainingError::EncoderMismatch {
                encoder: 3,
                agent: 28
            }
        ));
    }

    #[test]
    fn missing_resume_checkpoint_fails_before_training() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = TrainingConfig {
            resume_from: Some(dir.path().join("missing.json")),
            ..short_training(dir.path())
        };
        let err = Trainer::new(short_env(), AgentConfig::default(), config)
            .err()
            .expect("should fail");
        assert!(matches!(
            err,
            TrainingError::Agent(AgentError::MissingCheckpoint(_))
        ));
        assert!(std::fs::read_dir(dir.path()).expect("read_dir").next().is_none());
    }

    #[test]
    fn run_ids_are_timestamped() {
        let id = new_run_id();
        let stamp = id
            .strip_prefix("run_")
            .and_then(|rest| rest.get(..15))
            .expect("timestamp");
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S").is_ok());
    }

    #[test]
    fn back_to_back_trainers_get_separate_run_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = Trainer::new(short_env(), AgentConfig::default(), short_training(dir.path()))
            .expect("trainer");
        let b = Trainer::new(short_env(), AgentConfig::default(), short_training(dir.path()))
            .expect("trainer");
        assert_ne!(a.run_dir(), b.run_dir());
        assert_eq!(a.run_dir().parent(), b.run_dir().parent());
    }
}
