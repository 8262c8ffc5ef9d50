//! Several independent training sessions, optionally on a thread pool.
//!
//! Layout under `results_dir`:
//!
//! ```text
//! batch_<timestamp>_<pid>_<n>/
//!     config.json
//!     results.json            # every finished session
//!     session_<i>/
//!         results.json        # this session only
//!         run_<timestamp>_*/  # checkpoints and training_report.json
//! ```

use crate::config::{AgentConfig, BatchConfig, EnvConfig};
use crate::metrics::{BatchReport, SessionResult};
use crate::persist::{stamped_name, write_json};
use crate::rng::session_seed;
use crate::trainer::{Trainer, TrainingError};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error("session {session} failed: {source}")]
    Session {
        session: usize,
        #[source]
        source: TrainingError,
    },
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Run every session of `batch` and write the combined results.
///
/// Each session owns its own environment and agent; the world, environment
/// and agent seeds of session `i` come from [`session_seed`]. Sessions that
/// finish are recorded even if a later one fails.
pub fn run_batch(
    batch: &BatchConfig,
    env_config: &EnvConfig,
    agent_config: &AgentConfig,
) -> Result<BatchReport, BatchError> {
    batch.validate()?;
    env_config.validate()?;
    agent_config.validate()?;

    let batch_dir = batch.results_dir.join(stamped_name("batch"));
    write(&batch_dir.join("config.json"), batch)?;
    info!(
        dir = %batch_dir.display(),
        sessions = batch.num_sessions,
        parallel = batch.parallel,
        "batch started"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(batch.parallel)
        .build()?;
    let outcomes: Vec<Result<SessionResult, BatchError>> = pool.install(|| {
        (0..batch.num_sessions)
            .into_par_iter()
            .map(|session| run_session(session, &batch_dir, batch, env_config, agent_config))
            .collect()
    });

    let mut sessions = Vec::with_capacity(outcomes.len());
    let mut first_error = None;
    for outcome in outcomes {
        match outcome {
            Ok(result) => sessions.push(result),
            Err(err) if first_error.is_none() => first_error = Some(err),
            Err(_) => {}
        }
    }

    let report = BatchReport {
        schema_version: 1,
        batch_dir: batch_dir.clone(),
        sessions,
    };
    write(&batch_dir.join("results.json"), &report.sessions)?;
    if let Some(err) = first_error {
        return Err(err);
    }
    info!(dir = %batch_dir.display(), "batch finished");
    Ok(report)
}

fn run_session(
    session: usize,
    batch_dir: &Path,
    batch: &BatchConfig,
    env_config: &EnvConfig,
    agent_config: &AgentConfig,
) -> Result<SessionResult, BatchError> {
    let session_dir = batch_dir.join(format!("session_{session}"));
    let seed = session_seed(env_config.arena.seed, session);
    let mut env = env_config.clone();
    env.arena.seed = seed;
    let agent = AgentConfig {
        seed,
        ..agent_config.clone()
    };

    let started = Instant::now();
    let report = Trainer::new(env, agent, batch.training_config(session_dir.clone()))
        .and_then(|mut trainer| trainer.run())
        .map_err(|source| BatchError::Session { session, source })?;
    let result = SessionResult {
        session_id: session,
        seed,
        run_id: report.run_id.clone(),
        training_time_secs: started.elapsed().as_secs_f64(),
        model_path: report.final_checkpoint.clone(),
        episodes: report.episodes.len(),
        avg_reward: report.avg_reward,
        best_reward: report.best_reward,
        final_epsilon: report.final_epsilon,
    };
    write(&session_dir.join("results.json"), &result)?;
    info!(
        session,
        avg_reward = result.avg_reward,
        secs = result.training_time_secs,
        "session finished"
    );
    Ok(result)
}

fn write<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), BatchError> {
    write_json(path, value).map_err(|source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    })
}
