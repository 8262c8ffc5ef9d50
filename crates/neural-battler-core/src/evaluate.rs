use crate::agent::AgentError;
use crate::config::{AgentConfig, ConfigError, EnvConfig, EvaluationConfig};
use crate::controller::CellController;
use crate::environment::{Environment, EnvironmentError};
use crate::metrics::{mean_std, EvaluationSummary};
use crate::persist::write_json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("model not found: {}", .0.display())]
    MissingModel(PathBuf),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Replay the greedy policy stored at `model_path` for `eval.episodes` episodes.
///
/// The environment uses `env_config` with the evaluation seed and step cap.
pub fn evaluate_model(
    model_path: &Path,
    env_config: &EnvConfig,
    agent_config: &AgentConfig,
    eval: &EvaluationConfig,
) -> Result<EvaluationSummary, EvaluationError> {
    if !model_path.exists() {
        return Err(EvaluationError::MissingModel(model_path.to_path_buf()));
    }
    eval.validate()?;
    let controller = CellController::load(model_path, agent_config.clone())?;

    let mut config = env_config.clone();
    config.max_steps = eval.max_steps;
    config.arena.seed = eval.seed;
    let mut env = Environment::new(config)?;

    let mut rewards = Vec::with_capacity(eval.episodes);
    let mut lengths = Vec::with_capacity(eval.episodes);
    let mut survival = Vec::with_capacity(eval.episodes);
    let mut remaining = Vec::with_capacity(eval.episodes);

    for episode in 0..eval.episodes {
        let mut state = env.reset();
        let mut total_reward = 0.0;
        loop {
            let action = match env.cell() {
                Some(cell) => controller.action(
                    cell,
                    env.tissue().pathogens(),
                    env.tissue().width(),
                    env.tissue().height(),
                ),
                None => controller.agent().greedy_action(&state),
            };
            let outcome = env.step(action)?;
            total_reward += outcome.reward;
            state = outcome.state;
            if outcome.done {
                break;
            }
        }
        let steps = env.steps() as f64;
        debug!(episode, reward = total_reward, steps, "evaluation episode finished");
        rewards.push(total_reward);
        lengths.push(steps);
        survival.push(steps / eval.ticks_per_second);
        remaining.push(env.tissue().pathogens().len() as f64);
    }

    let (avg_reward, std_reward) = mean_std(&rewards);
    let (avg_survival_time, std_survival_time) = mean_std(&survival);
    let (avg_episode_length, std_episode_length) = mean_std(&lengths);
    let (avg_pathogen_count, std_pathogen_count) = mean_std(&remaining);
    let summary = EvaluationSummary {
        model_path: model_path.to_path_buf(),
        num_episodes: eval.episodes,
        avg_reward,
        std_reward,
        avg_survival_time,
        std_survival_time,
        avg_episode_length,
        std_episode_length,
        avg_pathogen_count,
        std_pathogen_count,
        max_survival_time: survival.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        min_survival_time: survival.iter().copied().fold(f64::INFINITY, f64::min),
    };
    info!(
        model = %model_path.display(),
        avg_reward = summary.avg_reward,
        avg_survival_time = summary.avg_survival_time,
        "evaluation finished"
    );
    Ok(summary)
}

/// Evaluate several models under identical settings, keyed by file name
/// (full path when two models share a file name). Every path is checked
/// before the first episode runs.
pub fn evaluate_models(
    model_paths: &[PathBuf],
    env_config: &EnvConfig,
    agent_config: &AgentConfig,
    eval: &EvaluationConfig,
) -> Result<BTreeMap<String, EvaluationSummary>, EvaluationError> {
    if let Some(missing) = model_paths.iter().find(|p| !p.exists()) {
        return Err(EvaluationError::MissingModel(missing.clone()));
    }
    let mut results = BTreeMap::new();
    for path in model_paths {
        let summary = evaluate_model(path, env_config, agent_config, eval)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !results.contains_key(n))
            .unwrap_or_else(|| path.display().to_string());
        results.insert(name, summary);
    }
    Ok(results)
}

/// Write a comparison as `<dir>/eval_<tag>.json`, where the tag is the name of
/// the first model's parent directory (`custom` when there is none).
pub fn save_comparison(
    dir: &Path,
    model_paths: &[PathBuf],
    results: &BTreeMap<String, EvaluationSummary>,
) -> Result<PathBuf, EvaluationError> {
    let tag = model_paths
        .first()
        .and_then(|p| p.parent())
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "custom".to_string());
    let path = dir.join(format!("eval_{tag}.json"));
    write_json(&path, results).map_err(|source| EvaluationError::Io {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), models = results.len(), "evaluation results saved");
    Ok(path)
}
