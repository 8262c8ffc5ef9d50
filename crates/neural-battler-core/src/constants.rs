/// Largest supported arena dimension (world units). Keeps squared distances well inside f64 precision.
pub const MAX_ARENA_SIZE: f64 = 16_384.0;

/// Default pathogen population cap enforced before every spawn.
pub const MAX_PATHOGENS: usize = 20;

/// Below this many entities proximity queries scan linearly instead of building an R*-tree.
pub const SPATIAL_INDEX_MIN_ENTITIES: usize = 10;

/// Prime multiplier used to derive independent RNG streams from a base seed.
pub const RNG_DERIVATION_PRIME: u64 = 7919;

/// Stream ids for `rng::derive_rng`.
pub const WORLD_RNG_STREAM: u64 = 1;
pub const ENVIRONMENT_RNG_STREAM: u64 = 2;
pub const AGENT_RNG_STREAM: u64 = 3;

/// Nearest pathogens described in the state vector.
pub const ENCODED_PATHOGENS: usize = 5;

/// Features per encoded pathogen: distance, dx, dy, health ratio.
pub const PATHOGEN_FEATURES: usize = 4;

/// Canonical state vector length: position(2) + walls(4) + pathogens(20) + health(1) + special(1).
pub const STATE_SIZE: usize = 2 + 4 + ENCODED_PATHOGENS * PATHOGEN_FEATURES + 1 + 1;

/// Discount factor for bootstrapped Q targets.
pub const DEFAULT_GAMMA: f32 = 0.99;

/// Replay buffer capacity.
pub const REPLAY_CAPACITY: usize = 10_000;

/// Batch session `i` seeds its world, environment and agent from stream `SESSION_RNG_STREAM_BASE + i`.
pub const SESSION_RNG_STREAM_BASE: u64 = 100;

/// Episodes averaged in progress logs.
pub const TRAILING_REWARD_WINDOW: usize = 100;

/// File stem shared by every checkpoint a run writes.
pub const CHECKPOINT_PREFIX: &str = "immune_cell_model";
