use crate::constants::{DEFAULT_GAMMA, MAX_PATHOGENS, REPLAY_CAPACITY, STATE_SIZE};
use crate::reward::RewardWeights;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArenaConfig {
    /// Deterministic seed for spawn positions, wander noise and division timers.
    pub seed: u64,
    /// Arena width in world units.
    pub width: f64,
    /// Arena height in world units.
    pub height: f64,
    /// Pathogen population cap. Every spawn path checks it first.
    pub max_pathogens: usize,
    /// Ticks before the first timed pathogen spawn.
    pub spawn_initial_cooldown: u32,
    /// Floor for the spawn period after repeated decay.
    pub spawn_min_cooldown: u32,
    /// Multiplier applied to the spawn period after each timed spawn (difficulty ramp).
    pub spawn_decay: f64,
    /// Timed spawns land at least this far from every wall.
    pub spawn_margin: f64,
    /// Populations smaller than this are queried by linear scan.
    pub spatial_index_min_entities: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            width: 800.0,
            height: 600.0,
            max_pathogens: MAX_PATHOGENS,
            spawn_initial_cooldown: 180,
            spawn_min_cooldown: 30,
            spawn_decay: 0.98,
            spawn_margin: 50.0,
            spatial_index_min_entities: crate::constants::SPATIAL_INDEX_MIN_ENTITIES,
        }
    }
}

impl ArenaConfig {
    pub fn with_size(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, name) in [(self.width, "width"), (self.height, "height")] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidArenaSize);
            }
            if value > crate::constants::MAX_ARENA_SIZE {
                return Err(ConfigError::ArenaTooLarge {
                    dimension: name,
                    max: crate::constants::MAX_ARENA_SIZE,
                    actual: value,
                });
            }
        }
        if self.max_pathogens == 0 {
            return Err(ConfigError::InvalidMaxPathogens);
        }
        if self.spawn_min_cooldown == 0 || self.spawn_initial_cooldown < self.spawn_min_cooldown {
            return Err(ConfigError::InvalidSpawnCooldown);
        }
        if !(self.spawn_decay.is_finite() && self.spawn_decay > 0.0 && self.spawn_decay <= 1.0) {
            return Err(ConfigError::InvalidSpawnDecay);
        }
        if !(self.spawn_margin.is_finite()
            && self.spawn_margin >= 0.0
            && 2.0 * self.spawn_margin < self.width.min(self.height))
        {
            return Err(ConfigError::InvalidSpawnMargin);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvConfig {
    pub arena: ArenaConfig,
    /// Episode length cap in environment steps.
    pub max_steps: u32,
    /// Pathogens placed at reset.
    pub initial_pathogens: usize,
    /// Inclusive range of pathogens placed when the arena has been cleared.
    pub respawn_min: usize,
    pub respawn_max: usize,
    /// Reset and respawn placements keep this distance from every wall.
    pub placement_margin: f64,
    /// Distance covered by one movement action.
    pub move_speed: f64,
    /// Distance under which the cell counts as hugging a wall.
    pub wall_margin: f64,
    /// Per-step chance of a wall ambush while the cell hugs a wall.
    pub wall_spawn_probability: f64,
    /// End the episode after this many consecutive blocked moves. `None` disables the check.
    pub wall_stuck_threshold: Option<u32>,
    /// When true the special burst fires only on the special action; otherwise as soon as mana is full.
    pub special_release_on_request: bool,
    pub reward: RewardWeights,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            arena: ArenaConfig::default(),
            max_steps: 1000,
            initial_pathogens: 5,
            respawn_min: 3,
            respawn_max: 7,
            placement_margin: 50.0,
            move_speed: 1.0,
            wall_margin: 50.0,
            wall_spawn_probability: 0.1,
            wall_stuck_threshold: Some(20),
            special_release_on_request: true,
            reward: RewardWeights::default(),
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.arena.validate()?;
        if self.max_steps == 0 {
            return Err(ConfigError::InvalidMaxSteps);
        }
        if self.initial_pathogens > self.arena.max_pathogens {
            return Err(ConfigError::TooManyInitialPathogens {
                max: self.arena.max_pathogens,
                actual: self.initial_pathogens,
            });
        }
        if self.respawn_min == 0 || self.respawn_min > self.respawn_max {
            return Err(ConfigError::InvalidRespawnRange);
        }
        if !(self.placement_margin.is_finite()
            && self.placement_margin >= 0.0
            && 2.0 * self.placement_margin < self.arena.width.min(self.arena.height))
        {
            return Err(ConfigError::InvalidPlacementMargin);
        }
        if !(self.move_speed.is_finite() && self.move_speed > 0.0) {
            return Err(ConfigError::InvalidMoveSpeed);
        }
        if !(self.wall_margin.is_finite() && self.wall_margin >= 0.0) {
            return Err(ConfigError::InvalidWallMargin);
        }
        if !(0.0..=1.0).contains(&self.wall_spawn_probability) {
            return Err(ConfigError::InvalidWallSpawnProbability);
        }
        if self.wall_stuck_threshold == Some(0) {
            return Err(ConfigError::InvalidWallStuckThreshold);
        }
        self.reward.validate()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub state_size: usize,
    pub action_size: usize,
    pub hidden_size: usize,
    pub learning_rate: f32,
    pub gamma: f32,
    pub replay_capacity: usize,
    /// Seed for weight init, exploration and minibatch sampling.
    pub seed: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            state_size: STATE_SIZE,
            action_size: crate::action::ACTION_COUNT,
            hidden_size: 64,
            learning_rate: 0.001,
            gamma: DEFAULT_GAMMA,
            replay_capacity: REPLAY_CAPACITY,
            seed: 42,
        }
    }
}

impl AgentConfig {
    pub fn new(state_size: usize, action_size: usize) -> Self {
        Self {
            state_size,
            action_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.state_size == 0 || self.action_size == 0 || self.hidden_size == 0 {
            return Err(ConfigError::InvalidNetworkShape);
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidLearningRate);
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ConfigError::InvalidGamma);
        }
        if self.replay_capacity == 0 {
            return Err(ConfigError::InvalidReplayCapacity);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: usize,
    pub batch_size: usize,
    /// Write a checkpoint every this many episodes.
    pub save_interval: usize,
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    /// Applied once at the start of every episode.
    pub epsilon_decay: f64,
    /// Root directory; each run writes into its own `run_<timestamp>` subdirectory.
    pub output_dir: PathBuf,
    /// Continue training from this checkpoint.
    pub resume_from: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 1000,
            batch_size: 64,
            save_interval: 100,
            epsilon_start: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            output_dir: PathBuf::from("data/neural_networks"),
            resume_from: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.episodes == 0 {
            return Err(ConfigError::InvalidEpisodes);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.save_interval == 0 {
            return Err(ConfigError::InvalidSaveInterval);
        }
        let unit = 0.0..=1.0;
        if !unit.contains(&self.epsilon_start)
            || !unit.contains(&self.epsilon_min)
            || self.epsilon_min > self.epsilon_start
            || !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0)
        {
            return Err(ConfigError::InvalidEpsilonSchedule);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub num_sessions: usize,
    pub episodes: usize,
    pub batch_size: usize,
    pub save_interval: usize,
    /// Checkpoint every session starts from.
    pub base_model: Option<PathBuf>,
    /// Worker threads; each session still owns its own world, environment and agent.
    pub parallel: usize,
    /// Root for `batch_<timestamp>` directories.
    pub results_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            num_sessions: 5,
            episodes: 500,
            batch_size: 64,
            save_interval: 100,
            base_model: None,
            parallel: 1,
            results_dir: PathBuf::from("data/batch_results"),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_sessions == 0 {
            return Err(ConfigError::InvalidSessionCount);
        }
        if self.parallel == 0 {
            return Err(ConfigError::InvalidParallelism);
        }
        self.training_config(PathBuf::new()).validate()
    }

    /// Training config for one session writing into `output_dir`.
    pub fn training_config(&self, output_dir: PathBuf) -> TrainingConfig {
        TrainingConfig {
            episodes: self.episodes,
            batch_size: self.batch_size,
            save_interval: self.save_interval,
            output_dir,
            resume_from: self.base_model.clone(),
            ..TrainingConfig::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluationConfig {
    pub episodes: usize,
    pub max_steps: u32,
    pub seed: u64,
    /// Simulation rate used to express survival in seconds.
    pub ticks_per_second: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            episodes: 50,
            max_steps: 1000,
            seed: 7,
            ticks_per_second: 60.0,
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.episodes == 0 {
            return Err(ConfigError::InvalidEpisodes);
        }
        if self.max_steps == 0 {
            return Err(ConfigError::InvalidMaxSteps);
        }
        if !(self.ticks_per_second.is_finite() && self.ticks_per_second > 0.0) {
            return Err(ConfigError::InvalidTicksPerSecond);
        }
        Ok(())
    }
}

macro_rules! define_config_error {
    (
        $(
            $variant:ident $( { $($field:ident : $type:ty),* } )? => $fmt:literal $(, $arg:expr)*
        );* $(;)?
    ) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum ConfigError {
            $(
                $variant $( { $($field : $type),* } )?,
            )*
        }

        impl std::fmt::Display for ConfigError {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        Self::$variant $( { $($field),* } )? => write!(f, $fmt $(, $arg)*),
                    )*
                }
            }
        }
    };
}

define_config_error! {
    InvalidArenaSize => "arena width and height must be positive and finite";
    ArenaTooLarge { dimension: &'static str, max: f64, actual: f64 } => "arena {dimension} ({actual}) exceeds supported maximum ({max})";
    InvalidMaxPathogens => "max_pathogens must be greater than 0";
    InvalidSpawnCooldown => "spawn_min_cooldown must be positive and not exceed spawn_initial_cooldown";
    InvalidSpawnDecay => "spawn_decay must be finite and within (0,1]";
    InvalidSpawnMargin => "spawn_margin must be non-negative and leave room inside the arena";
    InvalidMaxSteps => "max_steps must be greater than 0";
    TooManyInitialPathogens { max: usize, actual: usize } => "initial_pathogens ({actual}) exceeds max_pathogens ({max})";
    InvalidRespawnRange => "respawn_min must be positive and not exceed respawn_max";
    InvalidPlacementMargin => "placement_margin must be non-negative and leave room inside the arena";
    InvalidMoveSpeed => "move_speed must be positive and finite";
    InvalidWallMargin => "wall_margin must be non-negative and finite";
    InvalidWallSpawnProbability => "wall_spawn_probability must be within [0,1]";
    InvalidWallStuckThreshold => "wall_stuck_threshold must be positive when set";
    InvalidRewardWeight { name: &'static str } => "reward weight {name} must be finite";
    InvalidRewardRadius { name: &'static str } => "reward radius {name} must be positive and finite";
    InvalidNetworkShape => "state_size, action_size and hidden_size must be greater than 0";
    InvalidLearningRate => "learning_rate must be positive and finite";
    InvalidGamma => "gamma must be within [0,1]";
    InvalidReplayCapacity => "replay_capacity must be greater than 0";
    InvalidEpisodes => "episodes must be greater than 0";
    InvalidBatchSize => "batch_size must be greater than 0";
    InvalidSaveInterval => "save_interval must be greater than 0";
    InvalidEpsilonSchedule => "epsilon_min <= epsilon_start must lie in [0,1] and epsilon_decay in (0,1]";
    InvalidSessionCount => "num_sessions must be greater than 0";
    InvalidParallelism => "parallel must be greater than 0";
    InvalidTicksPerSecond => "ticks_per_second must be positive and finite";
}

impl std::error::Error for ConfigError {}
