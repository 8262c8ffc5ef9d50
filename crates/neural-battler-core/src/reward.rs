use crate::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Coefficients for [`ShapedReward`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RewardWeights {
    /// Granted every step the cell is alive.
    pub survival_bonus: f64,
    /// Added once on any step where health dropped (negative).
    pub health_loss_penalty: f64,
    /// Per pathogen removed this step.
    pub kill_bonus: f64,
    /// Nearest-pathogen distance at which the full distance bonus is paid.
    pub safe_distance: f64,
    pub distance_bonus: f64,
    /// Wall distance under which the quadratic wall penalty applies.
    pub wall_margin: f64,
    pub wall_penalty_scale: f64,
    /// Paid inside the wall margin when the step brought the cell closer to the centre.
    pub center_bonus: f64,
    /// Added on the step the cell dies (negative).
    pub death_penalty: f64,
    /// Added on the step the last pathogen disappears.
    pub clear_bonus: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            survival_bonus: 0.1,
            health_loss_penalty: -1.0,
            kill_bonus: 0.5,
            safe_distance: 100.0,
            distance_bonus: 0.2,
            wall_margin: 100.0,
            wall_penalty_scale: 0.5,
            center_bonus: 0.1,
            death_penalty: -10.0,
            clear_bonus: 10.0,
        }
    }
}

impl RewardWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            (self.survival_bonus, "survival_bonus"),
            (self.health_loss_penalty, "health_loss_penalty"),
            (self.kill_bonus, "kill_bonus"),
            (self.distance_bonus, "distance_bonus"),
            (self.wall_penalty_scale, "wall_penalty_scale"),
            (self.center_bonus, "center_bonus"),
            (self.death_penalty, "death_penalty"),
            (self.clear_bonus, "clear_bonus"),
        ];
        for (value, name) in weights {
            if !value.is_finite() {
                return Err(ConfigError::InvalidRewardWeight { name });
            }
        }
        for (value, name) in [
            (self.safe_distance, "safe_distance"),
            (self.wall_margin, "wall_margin"),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidRewardRadius { name });
            }
        }
        Ok(())
    }

    /// Inclusive range of [`ShapedReward`] on a step that neither kills the cell
    /// nor clears the arena and removes at most `max_kills` pathogens.
    pub fn step_bounds(&self, max_kills: usize) -> (f64, f64) {
        let lower = self.survival_bonus
            + self.health_loss_penalty.min(0.0)
            + self.kill_bonus.min(0.0) * max_kills as f64
            + self.distance_bonus.min(0.0)
            - self.wall_penalty_scale.abs()
            + self.center_bonus.min(0.0);
        let upper = self.survival_bonus
            + self.health_loss_penalty.max(0.0)
            + self.kill_bonus.max(0.0) * max_kills as f64
            + self.distance_bonus.max(0.0)
            + self.center_bonus.max(0.0);
        (lower, upper)
    }
}

/// Everything a reward policy may look at for one environment step.
#[derive(Clone, Debug, PartialEq)]
pub struct RewardContext {
    pub previous_health: u32,
    pub health: u32,
    pub pathogens_killed: usize,
    /// `None` when no pathogen is left.
    pub nearest_pathogen_distance: Option<f64>,
    /// Distance from the cell to the closest wall after the move.
    pub wall_distance: f64,
    pub previous_center_distance: f64,
    pub center_distance: f64,
    pub died: bool,
    pub arena_cleared: bool,
}

/// Scalar reward for one step. Implementations must be pure.
pub trait RewardPolicy: Send + Sync {
    fn reward(&self, ctx: &RewardContext) -> f64;
}

/// Default composite reward: survival bonus, health-loss penalty, kill bonus,
/// distance shaping around a safe radius, quadratic wall penalty offset by a
/// centre-seeking bonus, and the death and arena-cleared terminals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShapedReward {
    pub weights: RewardWeights,
}

impl ShapedReward {
    pub fn new(weights: RewardWeights) -> Self {
        Self { weights }
    }
}

impl RewardPolicy for ShapedReward {
    fn reward(&self, ctx: &RewardContext) -> f64 {
        let w = &self.weights;
        let mut reward = w.survival_bonus;

        if ctx.health < ctx.previous_health {
            reward += w.health_loss_penalty;
        }

        reward += w.kill_bonus * ctx.pathogens_killed as f64;

        if let Some(d) = ctx.nearest_pathogen_distance {
            reward += if d > w.safe_distance {
                w.distance_bonus
            } else {
                w.distance_bonus * (d / w.safe_distance)
            };
        }

        if ctx.wall_distance < w.wall_margin {
            let closeness = (w.wall_margin - ctx.wall_distance.max(0.0)) / w.wall_margin;
            reward -= w.wall_penalty_scale * closeness * closeness;
            if ctx.center_distance < ctx.previous_center_distance {
                reward += w.center_bonus;
            }
        }

        if ctx.died {
            reward += w.death_penalty;
        }
        if ctx.arena_cleared {
            reward += w.clear_bonus;
        }

        reward
    }
}
