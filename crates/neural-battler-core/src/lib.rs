pub mod action;
pub mod agent;
pub mod batch;
pub mod cell;
pub mod config;
pub mod constants;
pub mod controller;
pub mod encoding;
pub mod environment;
pub mod evaluate;
pub mod metrics;
pub mod nn;
pub mod optim;
pub mod pathogen;
pub mod persist;
pub mod replay;
pub mod reward;
pub mod rng;
pub mod spatial;
pub mod trainer;
pub mod world;

pub use action::{action_to_movement, Action, ACTION_COUNT};
pub use agent::{AgentError, DqnAgent};
pub use constants::{MAX_PATHOGENS, STATE_SIZE};
pub use environment::{Environment, StepOutcome};
pub use metrics::{
    ArenaSnapshot, BatchReport, EntitySnapshot, EpisodeRecord, EvaluationSummary, SessionResult,
    TrainingReport,
};
pub use world::{TickReport, Tissue};
