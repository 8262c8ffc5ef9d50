use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use neural_battler_core::batch::run_batch;
use neural_battler_core::config::{
    AgentConfig, BatchConfig, EnvConfig, EvaluationConfig, TrainingConfig,
};
use neural_battler_core::evaluate::{evaluate_models, save_comparison};
use neural_battler_core::trainer::Trainer;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "neural-battler")]
#[command(about = "Headless training and evaluation for the immune-cell survival agent")]
struct Cli {
    /// Path to a config file (JSON); missing sections use defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train one agent
    Train {
        #[arg(long)]
        episodes: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Write a checkpoint every N episodes
        #[arg(long)]
        save_interval: Option<usize>,

        /// Continue from an existing checkpoint
        #[arg(long)]
        model: Option<PathBuf>,

        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Train several independent sessions
    Batch {
        #[arg(long)]
        sessions: Option<usize>,

        #[arg(long)]
        episodes: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        save_interval: Option<usize>,

        /// Checkpoint every session starts from
        #[arg(long)]
        base_model: Option<PathBuf>,

        /// Number of sessions trained at once
        #[arg(long)]
        parallel: Option<usize>,
    },
    /// Evaluate one or more trained models with the greedy policy
    Evaluate {
        /// Checkpoint files to evaluate
        #[arg(long, required = true, num_args = 1..)]
        models: Vec<PathBuf>,

        #[arg(long)]
        episodes: Option<usize>,

        #[arg(long)]
        max_steps: Option<u32>,

        /// Directory for the comparison file
        #[arg(long, default_value = "data/evaluations")]
        out: PathBuf,
    },
    /// Dump the default configuration to stdout
    DumpDefaultConfig,
}

/// Everything the driver can be configured with, one section per concern.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RunConfig {
    env: EnvConfig,
    agent: AgentConfig,
    training: TrainingConfig,
    batch: BatchConfig,
    evaluation: EvaluationConfig,
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };
    let file = File::open(path)
        .with_context(|| format!("failed to open config file {}", path.display()))?;
    let config: RunConfig = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    info!(path = %path.display(), "loaded config");
    Ok(config)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::DumpDefaultConfig => {
            println!("{}", serde_json::to_string_pretty(&RunConfig::default())?);
        }
        Commands::Train {
            episodes,
            batch_size,
            save_interval,
            model,
            output_dir,
        } => {
            let training = &mut config.training;
            training.episodes = episodes.unwrap_or(training.episodes);
            training.batch_size = batch_size.unwrap_or(training.batch_size);
            training.save_interval = save_interval.unwrap_or(training.save_interval);
            if model.is_some() {
                training.resume_from = model;
            }
            if let Some(dir) = output_dir {
                training.output_dir = dir;
            }

            println!("Training for {} episodes...", config.training.episodes);
            let mut trainer = Trainer::new(config.env, config.agent, config.training)
                .context("failed to set up training")?;
            let report = trainer.run().context("training failed")?;
            println!(
                "Training complete. Avg reward {:.2}, best {:.2}. Final model: {}",
                report.avg_reward,
                report.best_reward,
                report.final_checkpoint.display()
            );
        }
        Commands::Batch {
            sessions,
            episodes,
            batch_size,
            save_interval,
            base_model,
            parallel,
        } => {
            let batch = &mut config.batch;
            batch.num_sessions = sessions.unwrap_or(batch.num_sessions);
            batch.episodes = episodes.unwrap_or(batch.episodes);
            batch.batch_size = batch_size.unwrap_or(batch.batch_size);
            batch.save_interval = save_interval.unwrap_or(batch.save_interval);
            batch.parallel = parallel.unwrap_or(batch.parallel);
            if base_model.is_some() {
                batch.base_model = base_model;
            }

            println!(
                "Batch training: {} sessions x {} episodes, {} in parallel",
                config.batch.num_sessions, config.batch.episodes, config.batch.parallel
            );
            let report = run_batch(&config.batch, &config.env, &config.agent)
                .context("batch training failed")?;
            if let Some(best) = report.best_session() {
                println!(
                    "Best session: {} (avg reward {:.2}) -> {}",
                    best.session_id,
                    best.avg_reward,
                    best.model_path.display()
                );
            }
            println!("Results saved to {}", report.batch_dir.display());
        }
        Commands::Evaluate {
            models,
            episodes,
            max_steps,
            out,
        } => {
            let eval = &mut config.evaluation;
            eval.episodes = episodes.unwrap_or(eval.episodes);
            eval.max_steps = max_steps.unwrap_or(eval.max_steps);

            let results = evaluate_models(&models, &config.env, &config.agent, &config.evaluation)
                .context("evaluation failed")?;
            for (name, summary) in &results {
                println!(
                    "{name}: survival {:.2}s (+/- {:.2}), reward {:.2}, remaining pathogens {:.1}",
                    summary.avg_survival_time,
                    summary.std_survival_time,
                    summary.avg_reward,
                    summary.avg_pathogen_count
                );
            }
            let path = save_comparison(&out, &models, &results)
                .context("failed to save evaluation results")?;
            println!("Results saved to {}", path.display());
        }
    }
    Ok(())
}
