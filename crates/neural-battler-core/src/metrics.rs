use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EntitySnapshot {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub health: u32,
    pub max_health: u32,
    pub radius: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProjectileSnapshot {
    /// Id of the immune cell that fired it.
    pub owner: u32,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

/// Read-only copy of the arena for renderers and replay files.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ArenaSnapshot {
    pub tick: u64,
    pub width: f64,
    pub height: f64,
    pub immune_cells: Vec<EntitySnapshot>,
    pub pathogens: Vec<EntitySnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projectiles: Vec<ProjectileSnapshot>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EpisodeRecord {
    pub episode: usize,
    pub total_reward: f64,
    pub steps: u32,
    pub epsilon: f64,
    /// Mean loss over the optimisation steps taken this episode.
    pub mean_loss: Option<f32>,
    pub pathogens_killed: usize,
    pub remaining_pathogens: usize,
}

fn default_schema_version() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainingReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub run_dir: PathBuf,
    pub final_checkpoint: PathBuf,
    pub episodes: Vec<EpisodeRecord>,
    pub final_epsilon: f64,
    pub best_reward: f64,
    pub avg_reward: f64,
    pub avg_steps: f64,
}

impl TrainingReport {
    /// Mean reward of the last `window` episodes.
    pub fn trailing_avg_reward(&self, window: usize) -> f64 {
        let take = window.min(self.episodes.len());
        if take == 0 {
            return 0.0;
        }
        let tail = &self.episodes[self.episodes.len() - take..];
        tail.iter().map(|e| e.total_reward).sum::<f64>() / take as f64
    }
}

/// Scalar aggregates over a set of evaluation episodes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EvaluationSummary {
    pub model_path: PathBuf,
    pub num_episodes: usize,
    pub avg_reward: f64,
    pub std_reward: f64,
    pub avg_survival_time: f64,
    pub std_survival_time: f64,
    pub avg_episode_length: f64,
    pub std_episode_length: f64,
    pub avg_pathogen_count: f64,
    pub std_pathogen_count: f64,
    pub max_survival_time: f64,
    pub min_survival_time: f64,
}

/// Outcome of one batch training session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionResult {
    pub session_id: usize,
    pub seed: u64,
    pub run_id: String,
    pub training_time_secs: f64,
    pub model_path: PathBuf,
    pub episodes: usize,
    pub avg_reward: f64,
    pub best_reward: f64,
    pub final_epsilon: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub batch_dir: PathBuf,
    pub sessions: Vec<SessionResult>,
}

impl BatchReport {
    /// Session with the highest average reward.
    pub fn best_session(&self) -> Option<&SessionResult> {
        self.sessions
            .iter()
            .max_by(|a, b| a.avg_reward.total_cmp(&b.avg_reward))
    }
}

/// Population mean and standard deviation. Empty input yields zeros.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
