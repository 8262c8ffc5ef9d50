use crate::action::Action;
use crate::cell::{distance, CellKind, ImmuneCell, ManaRelease};
use crate::config::{ConfigError, EnvConfig};
use crate::constants::ENVIRONMENT_RNG_STREAM;
use crate::encoding::{StateEncoder, SurvivalEncoder};
use crate::pathogen::{clamp_into, PathogenKind};
use crate::reward::{RewardContext, RewardPolicy, ShapedReward};
use crate::rng::derive_rng;
use crate::world::Tissue;
use rand::Rng;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Horizontal (or vertical) band along a wall where ambush pathogens appear.
const WALL_SPAWN_DEPTH: i32 = 20;
/// Spread of an ambush along the wall, either side of the cell.
const WALL_SPAWN_SPREAD: i32 = 30;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("episode has finished; call reset() before stepping again")]
    EpisodeFinished,
}

/// Why an episode ended. When several apply on the same step the first listed
/// wins: `CellDied`, then `MaxSteps`, then `WallStuck`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    CellDied,
    MaxSteps,
    /// Too many consecutive moves were blocked by a wall.
    WallStuck,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub tick: u64,
    pub step: u32,
    pub health: u32,
    pub pathogen_count: usize,
    pub kills: usize,
    pub moved: bool,
    pub wall_spawned: bool,
    /// Pathogens placed because the arena had been cleared.
    pub respawned: usize,
    pub termination: Option<TerminationReason>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    pub state: Vec<f32>,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Single-cell survival episode on top of a [`Tissue`].
///
/// The steered cell starts in the centre; pathogens are placed clear of the
/// walls. Encoding and reward are pluggable.
pub struct Environment {
    config: EnvConfig,
    tissue: Tissue,
    encoder: Box<dyn StateEncoder>,
    reward_policy: Box<dyn RewardPolicy>,
    rng: ChaCha12Rng,
    cell_id: u32,
    // Kept so a state can still be encoded after the cell has been removed.
    last_cell: Option<ImmuneCell>,
    steps: u32,
    blocked_moves: u32,
    done: bool,
}

impl Environment {
    pub fn new(config: EnvConfig) -> Result<Self, ConfigError> {
        let reward = ShapedReward::new(config.reward.clone());
        Self::with_policies(config, Box::new(SurvivalEncoder), Box::new(reward))
    }

    pub fn with_policies(
        config: EnvConfig,
        encoder: Box<dyn StateEncoder>,
        reward_policy: Box<dyn RewardPolicy>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let tissue = Tissue::new(config.arena.clone())?;
        let rng = derive_rng(config.arena.seed, ENVIRONMENT_RNG_STREAM);
        let mut env = Self {
            config,
            tissue,
            encoder,
            reward_policy,
            rng,
            cell_id: 0,
            last_cell: None,
            steps: 0,
            blocked_moves: 0,
            done: false,
        };
        env.reset();
        Ok(env)
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn tissue(&self) -> &Tissue {
        &self.tissue
    }

    pub fn state_size(&self) -> usize {
        self.encoder.state_size()
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The steered cell, while it is still in the world.
    pub fn cell(&self) -> Option<&ImmuneCell> {
        self.tissue.immune_cell(self.cell_id)
    }

    /// Start a new episode and return its first state.
    pub fn reset(&mut self) -> Vec<f32> {
        self.tissue.reset();
        self.steps = 0;
        self.blocked_moves = 0;
        self.done = false;

        let release = if self.config.special_release_on_request {
            ManaRelease::OnRequest
        } else {
            ManaRelease::Automatic
        };
        let (cx, cy) = (self.tissue.width() / 2.0, self.tissue.height() / 2.0);
        self.cell_id = self
            .tissue
            .add_immune_cell(cx, cy, CellKind::Agent { release });
        self.last_cell = self.cell().cloned();

        self.place_pathogens(self.config.initial_pathogens);
        self.state()
    }

    /// Encoding of the current arena from the steered cell's point of view.
    pub fn state(&self) -> Vec<f32> {
        let cell = self.cell().or(self.last_cell.as_ref());
        match cell {
            Some(cell) => self.encoder.encode(
                cell,
                self.tissue.pathogens(),
                self.tissue.width(),
                self.tissue.height(),
            ),
            None => vec![0.0; self.encoder.state_size()],
        }
    }

    /// Apply `action`, advance the world one tick and score the transition.
    ///
    /// Panics on an out-of-range action index.
    pub fn step(&mut self, action: usize) -> Result<StepOutcome, EnvironmentError> {
        if self.done {
            return Err(EnvironmentError::EpisodeFinished);
        }
        let action = Action::from_index(action);
        let (width, height) = (self.tissue.width(), self.tissue.height());
        let centre = [width / 2.0, height / 2.0];

        let (previous_health, previous_position) = match self.cell() {
            Some(cell) => (cell.health, cell.position),
            None => (0, centre),
        };

        let (dx, dy) = action.direction();
        let speed = self.config.move_speed;
        let target = [previous_position[0] + dx * speed, previous_position[1] + dy * speed];
        let wants_to_move = dx != 0.0 || dy != 0.0;
        let moved = wants_to_move && self.tissue.move_immune_cell(self.cell_id, target[0], target[1]);
        // Only a living cell pushing against a wall counts as stuck.
        if wants_to_move && !moved && self.cell().is_some() {
            self.blocked_moves += 1;
        } else {
            self.blocked_moves = 0;
        }
        if action.is_special() {
            self.tissue.request_special(self.cell_id);
        }

        let report = self.tissue.update();
        self.steps += 1;

        match self.cell().cloned() {
            Some(cell) => self.last_cell = Some(cell),
            None => {
                if let Some(cell) = self.last_cell.as_mut() {
                    cell.health = 0;
                }
            }
        }
        let (health, position) = match &self.last_cell {
            Some(cell) => (cell.health, cell.position),
            None => (0, previous_position),
        };
        let died = health == 0;

        let wall_spawned = !died && self.maybe_spawn_at_wall(position);

        let nearest_pathogen_distance = self
            .tissue
            .pathogens()
            .iter()
            .map(|p| distance(position, p.position))
            .min_by(f64::total_cmp);
        let arena_cleared = self.tissue.pathogens().is_empty();

        let reward = self.reward_policy.reward(&RewardContext {
            previous_health,
            health,
            pathogens_killed: report.pathogens_killed,
            nearest_pathogen_distance,
            wall_distance: wall_distance(position, width, height),
            previous_center_distance: distance(previous_position, centre),
            center_distance: distance(position, centre),
            died,
            arena_cleared,
        });

        let respawned = if arena_cleared {
            let count = self
                .rng
                .random_range(self.config.respawn_min..=self.config.respawn_max);
            self.place_pathogens(count)
        } else {
            0
        };

        let termination = if died {
            Some(TerminationReason::CellDied)
        } else if self.steps >= self.config.max_steps {
            Some(TerminationReason::MaxSteps)
        } else if self
            .config
            .wall_stuck_threshold
            .is_some_and(|limit| self.blocked_moves >= limit)
        {
            Some(TerminationReason::WallStuck)
        } else {
            None
        };
        self.done = termination.is_some();

        Ok(StepOutcome {
            state: self.state(),
            reward,
            done: self.done,
            info: StepInfo {
                tick: report.tick,
                step: self.steps,
                health,
                pathogen_count: self.tissue.pathogens().len(),
                kills: report.pathogens_killed,
                moved,
                wall_spawned,
                respawned,
                termination,
            },
        })
    }

    /// Place up to `count` bacteria uniformly inside the placement margin.
    /// Stops early at the population cap; returns how many were placed.
    fn place_pathogens(&mut self, count: usize) -> usize {
        let margin = self.config.placement_margin;
        let (width, height) = (self.tissue.width(), self.tissue.height());
        let mut placed = 0;
        for _ in 0..count {
            let x = self.rng.random_range(margin..width - margin);
            let y = self.rng.random_range(margin..height - margin);
            if self.tissue.add_pathogen(x, y, PathogenKind::Bacteria).is_none() {
                break;
            }
            placed += 1;
        }
        placed
    }

    /// While the cell hugs a wall, occasionally drop a bacterium in a band along
    /// the nearest wall next to it.
    fn maybe_spawn_at_wall(&mut self, position: [f64; 2]) -> bool {
        let (width, height) = (self.tissue.width(), self.tissue.height());
        if wall_distance(position, width, height) >= self.config.wall_margin
            || !self.tissue.can_add_pathogen()
            || !self.rng.random_bool(self.config.wall_spawn_probability)
        {
            return false;
        }

        let [x, y] = position;
        let along = |rng: &mut ChaCha12Rng, base: f64| {
            base + rng.random_range(-WALL_SPAWN_SPREAD..=WALL_SPAWN_SPREAD) as f64
        };
        let depth = |rng: &mut ChaCha12Rng| rng.random_range(0..=WALL_SPAWN_DEPTH) as f64;

        let walls = [x, width - x, y, height - y];
        let nearest = walls
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(i, _)| i);
        let (sx, sy) = match nearest {
            0 => (depth(&mut self.rng), along(&mut self.rng, y)),
            1 => (width - depth(&mut self.rng), along(&mut self.rng, y)),
            2 => (along(&mut self.rng, x), depth(&mut self.rng)),
            _ => (along(&mut self.rng, x), height - depth(&mut self.rng)),
        };

        self.tissue
            .add_pathogen(clamp_into(sx, width), clamp_into(sy, height), PathogenKind::Bacteria)
            .is_some()
    }
}

/// Distance from `position` to the closest of the four walls.
pub fn wall_distance(position: [f64; 2], width: f64, height: f64) -> f64 {
    let [x, y] = position;
    x.min(width - x).min(y).min(height - y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ACTION_COUNT;
    use crate::constants::STATE_SIZE;

    fn quiet_config() -> EnvConfig {
        EnvConfig {
            initial_pathogens: 0,
            wall_spawn_probability: 0.0,
            ..EnvConfig::default()
        }
    }

    #[test]
    fn reset_places_cell_in_centre_and_pathogens_clear_of_walls() {
        let mut env = Environment::new(EnvConfig::default()).expect("env");
        let state = env.reset();
        assert_eq!(state.len(), STATE_SIZE);
        let cell = env.cell().expect("cell");
        assert_eq!(cell.position, [400.0, 300.0]);
        assert_eq!(env.tissue().pathogens().len(), 5);
        for p in env.tissue().pathogens() {
            assert!((50.0..750.0).contains(&p.x()));
            assert!((50.0..550.0).contains(&p.y()));
        }
    }

    #[test]
    fn stay_step_from_reset_is_bounded_and_not_done() {
        let config = EnvConfig::default();
        let (lo, hi) = config.reward.step_bounds(config.arena.max_pathogens);
        let mut env = Environment::new(config).expect("env");
        env.reset();
        let outcome = env.step(Action::Stay.index()).expect("step");
        assert!(!outcome.done);
        assert_eq!(outcome.state.len(), STATE_SIZE);
        assert!(outcome.reward.is_finite());
        assert!(
            (lo..=hi).contains(&outcome.reward),
            "reward {} outside [{lo}, {hi}]",
            outcome.reward
        );
        assert_eq!(outcome.info.termination, None);
    }

    #[test]
    fn movement_updates_position_by_speed() {
        let mut env = Environment::new(quiet_config()).expect("env");
        env.reset();
        let outcome = env.step(Action::Right.index()).expect("step");
        assert!(outcome.info.moved);
        assert_eq!(env.cell().expect("cell").position, [401.0, 300.0]);
    }

    #[test]
    fn episode_ends_at_max_steps_and_refuses_further_steps() {
        let mut env = Environment::new(EnvConfig {
            max_steps: 3,
            ..quiet_config()
        })
        .expect("env");
        env.reset();
        for _ in 0..2 {
            assert!(!env.step(Action::Stay.index()).expect("step").done);
        }
        let last = env.step(Action::Stay.index()).expect("step");
        assert!(last.done);
        assert_eq!(last.info.termination, Some(TerminationReason::MaxSteps));
        assert_eq!(
            env.step(Action::Stay.index()),
            Err(EnvironmentError::EpisodeFinished)
        );
        env.reset();
        assert!(env.step(Action::Stay.index()).is_ok());
    }

    #[test]
    fn blocked_moves_end_the_episode() {
        let mut env = Environment::new(EnvConfig {
            move_speed: 1000.0,
            wall_stuck_threshold: Some(3),
            ..quiet_config()
        })
        .expect("env");
        env.reset();
        let mut last = None;
        for _ in 0..3 {
            let outcome = env.step(Action::Up.index()).expect("step");
            assert!(!outcome.info.moved);
            last = Some(outcome);
        }
        let last = last.expect("stepped");
        assert!(last.done);
        assert_eq!(last.info.termination, Some(TerminationReason::WallStuck));
    }

    #[test]
    fn step_cap_takes_precedence_over_stuck() {
        let mut env = Environment::new(EnvConfig {
            move_speed: 1000.0,
            wall_stuck_threshold: Some(1),
            max_steps: 1,
            ..quiet_config()
        })
        .expect("env");
        env.reset();
        let outcome = env.step(Action::Up.index()).expect("step");
        assert!(outcome.done);
        assert_eq!(outcome.info.termination, Some(TerminationReason::MaxSteps));
    }

    #[test]
    fn disabled_stuck_check_never_fires() {
        let mut env = Environment::new(EnvConfig {
            move_speed: 1000.0,
            wall_stuck_threshold: None,
            max_steps: 50,
            ..quiet_config()
        })
        .expect("env");
        env.reset();
        for _ in 0..49 {
            assert!(!env.step(Action::Left.index()).expect("step").done);
        }
    }

    #[test]
    fn cleared_arena_pays_bonus_and_respawns() {
        let mut env = Environment::new(quiet_config()).expect("env");
        env.reset();
        let outcome = env.step(Action::Stay.index()).expect("step");
        assert!((3..=7).contains(&outcome.info.respawned));
        assert_eq!(outcome.info.pathogen_count, outcome.info.respawned);
        assert!(outcome.reward >= env.config().reward.clear_bonus);
    }

    #[test]
    fn wall_ambush_lands_inside_arena_near_wall() {
        let mut env = Environment::new(EnvConfig {
            initial_pathogens: 1,
            wall_spawn_probability: 1.0,
            move_speed: 360.0,
            ..EnvConfig::default()
        })
        .expect("env");
        env.reset();
        let outcome = env.step(Action::Left.index()).expect("step");
        assert!(outcome.info.moved);
        assert!(outcome.info.wall_spawned);
        let ambush = env
            .tissue()
            .pathogens()
            .iter()
            .max_by_key(|p| p.id)
            .expect("pathogen");
        assert!(ambush.x() <= 20.0);
        assert!((ambush.y() - 300.0).abs() <= 30.0 + 1.0);
        assert!(env.tissue().is_valid_position(ambush.x(), ambush.y()));
    }

    #[test]
    fn special_action_keeps_cell_in_place() {
        let mut env = Environment::new(quiet_config()).expect("env");
        env.reset();
        let outcome = env.step(Action::Special.index()).expect("step");
        assert!(!outcome.info.moved);
        assert_eq!(env.cell().expect("cell").position, [400.0, 300.0]);
        assert_eq!(outcome.state[27], 0.0);
    }

    #[test]
    fn same_seed_replays_identically() {
        let run = || {
            let mut env = Environment::new(EnvConfig::default()).expect("env");
            env.reset();
            (0..200)
                .map(|i| {
                    let outcome = env.step(i % ACTION_COUNT).expect("step");
                    (outcome.reward, outcome.info.pathogen_count)
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EnvConfig {
            max_steps: 0,
            ..EnvConfig::default()
        };
        assert!(matches!(
            Environment::new(config),
            Err(ConfigError::InvalidMaxSteps)
        ));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_action_panics() {
        let mut env = Environment::new(quiet_config()).expect("env");
        let _ = env.step(ACTION_COUNT);
    }

    #[test]
    fn wall_distance_is_minimum_of_four() {
        assert_eq!(wall_distance([10.0, 300.0], 800.0, 600.0), 10.0);
        assert_eq!(wall_distance([400.0, 590.0], 800.0, 600.0), 10.0);
        assert_eq!(wall_distance([400.0, 300.0], 800.0, 600.0), 300.0);
    }
}
